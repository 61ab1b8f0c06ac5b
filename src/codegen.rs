//! Code generator for MiniAPL programs
//!
//! Lowers each statement, in program order, into instructions of a single
//! entry function. Shapes come from the [`ShapeTable`] built by the
//! analyzer; any precondition the analyzer should have caught is checked
//! again here and reported as a code generation error.

use std::collections::HashMap;

use crate::analyzer::ShapeTable;
use crate::ast::{Builtin, Expr, ExprKind, Program, Shape, Statement};
use crate::error::{CompileError, CompileResult};
use crate::ir::{BinaryOp, Function, Instruction, Reg, TranslationUnit};

/// A materialized array value: its storage and its shape
#[derive(Debug, Clone)]
struct Value {
    reg: Reg,
    shape: Shape,
}

/// Code generator for the MiniAPL backend
pub struct CodeGenerator<'a> {
    shapes: &'a ShapeTable,
    function: Function,
    /// Storage bound to each assigned name
    values: HashMap<String, Value>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(shapes: &'a ShapeTable, entry_symbol: &str) -> Self {
        Self {
            shapes,
            function: Function::new(entry_symbol),
            values: HashMap::new(),
        }
    }

    /// Generate a translation unit whose entry function runs the program
    pub fn generate(
        mut self,
        program: &Program,
        unit_name: impl Into<String>,
    ) -> CompileResult<TranslationUnit> {
        for stmt in &program.statements {
            self.generate_statement(stmt)?;
        }
        self.function.push(Instruction::Ret);

        let mut unit = TranslationUnit::new(unit_name);
        unit.add_function(self.function);
        Ok(unit)
    }

    fn generate_statement(&mut self, stmt: &Statement) -> CompileResult<()> {
        match stmt {
            Statement::Assign { name, value } => {
                let value = self.generate_expr(value)?;
                self.values.insert(name.clone(), value);
            }
            Statement::Expr(value) => {
                self.generate_expr(value)?;
            }
        }
        Ok(())
    }

    fn shape_of(&self, expr: &Expr) -> CompileResult<Shape> {
        self.shapes
            .get(expr.id)
            .cloned()
            .ok_or_else(|| CompileError::codegen(format!("`{}` has no inferred shape", expr)))
    }

    fn generate_expr(&mut self, expr: &Expr) -> CompileResult<Value> {
        let shape = self.shape_of(expr)?;

        match &expr.kind {
            ExprKind::Number(value) => {
                let reg = self.function.fresh(1);
                self.function.push(Instruction::Const { dst: reg, value: *value });
                Ok(Value { reg, shape })
            }

            ExprKind::Variable(name) => {
                let value = self
                    .values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CompileError::codegen(format!("variable `{}` has no storage", name)))?;
                if value.shape != shape {
                    return Err(CompileError::codegen(format!(
                        "variable `{}` is bound to shape {} but was inferred as {}",
                        name, value.shape, shape
                    )));
                }
                Ok(value)
            }

            ExprKind::Call { callee, args } => match Builtin::from_callee(callee) {
                Some(Builtin::MkArray) => {
                    let reg = self.alloc(expr, &shape)?;
                    Ok(Value { reg, shape })
                }
                Some(Builtin::Reduce) => self.generate_reduce(expr, args, shape),
                Some(Builtin::Add) => self.generate_binary(expr, BinaryOp::Add, args, shape),
                Some(Builtin::Sub) => self.generate_binary(expr, BinaryOp::Sub, args, shape),
                None => self.generate_print(expr, args),
            },
        }
    }

    /// Allocate zero-initialised storage for a shape
    fn alloc(&mut self, call: &Expr, shape: &Shape) -> CompileResult<Reg> {
        let len = element_count(call, shape)?;
        let reg = self.function.fresh(len);
        self.function.push(Instruction::Alloc { dst: reg, len });
        Ok(reg)
    }

    fn generate_reduce(&mut self, call: &Expr, args: &[Expr], shape: Shape) -> CompileResult<Value> {
        let src = self.generate_expr(argument(call, args, 0)?)?;
        let (reduced, inner) = src
            .shape
            .split_last()
            .ok_or_else(|| CompileError::codegen(format!("`{}` reduces a 0-D array", call)))?;
        if reduced != shape {
            return Err(CompileError::codegen(format!(
                "`{}` produces {} but was inferred as {}",
                call, reduced, shape
            )));
        }

        let outer = element_count(call, &shape)?;
        let reg = self.function.fresh(outer);
        self.function.push(Instruction::Reduce {
            dst: reg,
            src: src.reg,
            outer,
            inner,
        });
        Ok(Value { reg, shape })
    }

    fn generate_binary(
        &mut self,
        call: &Expr,
        op: BinaryOp,
        args: &[Expr],
        shape: Shape,
    ) -> CompileResult<Value> {
        let lhs = self.generate_expr(argument(call, args, 0)?)?;
        let rhs = self.generate_expr(argument(call, args, 1)?)?;
        if lhs.shape != shape || rhs.shape != shape {
            return Err(CompileError::codegen(format!(
                "`{}` combines {} and {} into {}",
                call, lhs.shape, rhs.shape, shape
            )));
        }

        let len = element_count(call, &shape)?;
        let reg = self.function.fresh(len);
        self.function.push(Instruction::Binary {
            op,
            dst: reg,
            lhs: lhs.reg,
            rhs: rhs.reg,
            len,
        });
        Ok(Value { reg, shape })
    }

    /// Generic pass-through: print every argument, yield the first
    fn generate_print(&mut self, call: &Expr, args: &[Expr]) -> CompileResult<Value> {
        let mut first = None;
        for arg in args {
            let value = self.generate_expr(arg)?;
            self.function.push(Instruction::Print {
                src: value.reg,
                dims: value.shape.dims().to_vec(),
            });
            if first.is_none() {
                first = Some(value);
            }
        }
        first.ok_or_else(|| CompileError::codegen(format!("`{}` has no argument to pass through", call)))
    }
}

fn argument<'e>(call: &Expr, args: &'e [Expr], index: usize) -> CompileResult<&'e Expr> {
    args.get(index)
        .ok_or_else(|| CompileError::codegen(format!("`{}` is missing argument {}", call, index + 1)))
}

/// Buffer length of a value with `shape`
fn element_count(call: &Expr, shape: &Shape) -> CompileResult<usize> {
    shape.cardinality().ok_or_else(|| {
        CompileError::codegen(format!("`{}` produces {}, too many elements to store", call, shape))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn generate(source: &str) -> TranslationUnit {
        let program = Parser::new(source).parse_program().unwrap();
        let shapes = Analyzer::new().analyze(&program).unwrap();
        CodeGenerator::new(&shapes, "main")
            .generate(&program, "test")
            .unwrap()
    }

    fn body(source: &str) -> Vec<Instruction> {
        generate(source).functions.remove(0).body
    }

    #[test]
    fn test_mk_array_allocates_cardinality() {
        assert_eq!(
            body("mkArray(2, 3, 4)"),
            vec![Instruction::Alloc { dst: Reg(0), len: 12 }, Instruction::Ret]
        );
    }

    #[test]
    fn test_variable_reuses_storage() {
        assert_eq!(
            body("assign x = mkArray(1, 3); print(x);"),
            vec![
                Instruction::Alloc { dst: Reg(0), len: 3 },
                Instruction::Print { src: Reg(0), dims: vec![3] },
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_reduce_sums_last_dimension() {
        assert_eq!(
            body("print(reduce(mkArray(2, 3, 4)))"),
            vec![
                Instruction::Alloc { dst: Reg(0), len: 12 },
                Instruction::Reduce {
                    dst: Reg(1),
                    src: Reg(0),
                    outer: 3,
                    inner: 4,
                },
                Instruction::Print { src: Reg(1), dims: vec![3] },
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_add_and_sub_lower_to_binary() {
        assert_eq!(
            body("sub(add(1, 2), 3)"),
            vec![
                Instruction::Const { dst: Reg(0), value: 1 },
                Instruction::Const { dst: Reg(1), value: 2 },
                Instruction::Binary {
                    op: BinaryOp::Add,
                    dst: Reg(2),
                    lhs: Reg(0),
                    rhs: Reg(1),
                    len: 1,
                },
                Instruction::Const { dst: Reg(3), value: 3 },
                Instruction::Binary {
                    op: BinaryOp::Sub,
                    dst: Reg(4),
                    lhs: Reg(2),
                    rhs: Reg(3),
                    len: 1,
                },
                Instruction::Ret,
            ]
        );
    }

    #[test]
    fn test_reassignment_rebinds_name() {
        let body = body("assign x = mkArray(1, 2); assign x = mkArray(1, 5); print(x);");
        assert_eq!(body[2], Instruction::Print { src: Reg(1), dims: vec![5] });
    }

    #[test]
    fn test_generated_unit_verifies() {
        let unit = generate(
            "assign a = mkArray(3, 2, 3, 4); assign b = reduce(reduce(a)); print(add(b, sub(b, b)));",
        );
        assert!(unit.verify().is_ok());
        assert!(unit.function("main").is_some());
    }

    #[test]
    fn test_missing_shape_is_codegen_error() {
        let program = Parser::new("print(1)").parse_program().unwrap();
        let shapes = ShapeTable::default();
        let err = CodeGenerator::new(&shapes, "main")
            .generate(&program, "test")
            .unwrap_err();
        assert!(matches!(err, CompileError::CodeGenError { .. }));
    }
}
