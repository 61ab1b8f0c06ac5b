//! Shape analyzer for MiniAPL programs
//!
//! Performs shape inference and checking on the AST as a full pre-pass:
//! every expression node gets exactly one entry in the [`ShapeTable`]
//! before code generation starts.

use std::collections::HashMap;

use crate::ast::{Builtin, Expr, ExprKind, NodeId, Program, Shape, Statement, MAX_ELEMENTS};
use crate::error::{CompileError, CompileResult};

/// Inferred shapes, keyed by node identity and by assigned name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeTable {
    nodes: HashMap<NodeId, Shape>,
    /// Shape of the latest assignment to each name, in program order
    variables: HashMap<String, Shape>,
}

impl ShapeTable {
    /// Shape of an expression node
    pub fn get(&self, id: NodeId) -> Option<&Shape> {
        self.nodes.get(&id)
    }

    /// Shape bound to a name by the last assignment
    pub fn variable(&self, name: &str) -> Option<&Shape> {
        self.variables.get(name)
    }

    /// Number of typed expression nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Analyzer for shape inference
#[derive(Default)]
pub struct Analyzer {
    table: ShapeTable,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a program and produce its shape table
    pub fn analyze(mut self, program: &Program) -> CompileResult<ShapeTable> {
        for stmt in &program.statements {
            self.analyze_statement(stmt)?;
        }
        Ok(self.table)
    }

    /// Analyze a statement
    fn analyze_statement(&mut self, stmt: &Statement) -> CompileResult<()> {
        match stmt {
            Statement::Assign { name, value } => {
                let shape = self.analyze_expr(value)?;
                // Later lookups of `name` resolve to this assignment
                self.table.variables.insert(name.clone(), shape);
            }
            Statement::Expr(value) => {
                self.analyze_expr(value)?;
            }
        }
        Ok(())
    }

    /// Analyze an expression and infer its shape, children first
    fn analyze_expr(&mut self, expr: &Expr) -> CompileResult<Shape> {
        let shape = match &expr.kind {
            ExprKind::Number(_) => Shape::scalar(),

            ExprKind::Variable(name) => self
                .table
                .variable(name)
                .cloned()
                .ok_or_else(|| CompileError::undefined(name))?,

            ExprKind::Call { callee, args } => {
                let mut arg_shapes = Vec::with_capacity(args.len());
                for arg in args {
                    arg_shapes.push(self.analyze_expr(arg)?);
                }
                self.analyze_call(expr, callee, args, arg_shapes)?
            }
        };

        self.table.nodes.insert(expr.id, shape.clone());
        Ok(shape)
    }

    /// Apply the shape rule of a call
    fn analyze_call(
        &self,
        call: &Expr,
        callee: &str,
        args: &[Expr],
        mut arg_shapes: Vec<Shape>,
    ) -> CompileResult<Shape> {
        match Builtin::from_callee(callee) {
            Some(Builtin::MkArray) => mk_array_shape(call, args),

            Some(Builtin::Reduce) => {
                expect_arity(call, &arg_shapes, 1)?;
                let (reduced, _) = arg_shapes[0]
                    .split_last()
                    .ok_or_else(|| CompileError::shape(call.to_string(), "cannot reduce a 0-D array"))?;
                Ok(reduced)
            }

            Some(Builtin::Add) | Some(Builtin::Sub) => {
                expect_arity(call, &arg_shapes, 2)?;
                let rhs = arg_shapes.pop().unwrap_or_default();
                let lhs = arg_shapes.pop().unwrap_or_default();
                if lhs != rhs {
                    return Err(CompileError::ShapeMismatch {
                        call: call.to_string(),
                        expected: lhs.to_string(),
                        got: rhs.to_string(),
                    });
                }
                Ok(lhs)
            }

            None => {
                if arg_shapes.is_empty() {
                    return Err(CompileError::shape(
                        call.to_string(),
                        format!("`{}` expects at least 1 argument", callee),
                    ));
                }
                Ok(arg_shapes.swap_remove(0))
            }
        }
    }
}

fn expect_arity(call: &Expr, arg_shapes: &[Shape], expected: usize) -> CompileResult<()> {
    if arg_shapes.len() == expected {
        Ok(())
    } else {
        Err(CompileError::shape(
            call.to_string(),
            format!("expects {} argument(s), got {}", expected, arg_shapes.len()),
        ))
    }
}

/// `mkArray(n, d1, ..., dn)` has shape `[d1, ..., dn]`
fn mk_array_shape(call: &Expr, args: &[Expr]) -> CompileResult<Shape> {
    let literal = |arg: &Expr| {
        arg.as_number().ok_or_else(|| {
            CompileError::shape(
                call.to_string(),
                format!("expects integer literal arguments, got `{}`", arg),
            )
        })
    };

    let (first, rest) = args
        .split_first()
        .ok_or_else(|| CompileError::shape(call.to_string(), "expects a dimension count"))?;

    let ndims = literal(first)?;
    if usize::try_from(ndims).ok() != Some(rest.len()) {
        return Err(CompileError::shape(
            call.to_string(),
            format!("declares {} dimension(s) but lists {}", ndims, rest.len()),
        ));
    }

    let mut dims = Vec::with_capacity(rest.len());
    for arg in rest {
        let len = literal(arg)?;
        match usize::try_from(len) {
            Ok(len) if len > 0 => dims.push(len),
            _ => {
                return Err(CompileError::shape(
                    call.to_string(),
                    format!("dimension length must be positive, got {}", len),
                ));
            }
        }
    }

    let shape = Shape::new(dims);
    if shape.cardinality().is_none() {
        return Err(CompileError::shape(
            call.to_string(),
            format!("{} holds more than {} elements", shape, MAX_ELEMENTS),
        ));
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn analyze(source: &str) -> CompileResult<(Program, ShapeTable)> {
        let program = Parser::new(source).parse_program()?;
        let table = Analyzer::new().analyze(&program)?;
        Ok((program, table))
    }

    fn shape_of(source: &str) -> Shape {
        let (program, table) = analyze(source).unwrap();
        let last = program.statements.last().unwrap().value();
        table.get(last.id).cloned().unwrap()
    }

    #[test]
    fn test_mk_array_shape() {
        let shape = shape_of("mkArray(2, 3, 4)");
        assert_eq!(shape, Shape::new(vec![3, 4]));
        assert_eq!(shape.cardinality(), Some(12));
    }

    #[test]
    fn test_mk_array_element_count_overflow() {
        let err = analyze("print(mkArray(3, 2147483647, 2147483647, 2147483647))").unwrap_err();
        assert!(
            matches!(&err, CompileError::ShapeError { call, .. } if call == "mkArray(3, 2147483647, 2147483647, 2147483647)"),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_mk_array_element_limit() {
        let err = analyze("assign x = mkArray(2, 2147483647, 2147483647);").unwrap_err();
        assert!(matches!(err, CompileError::ShapeError { .. }), "{:?}", err);
        assert!(err.to_string().contains("more than"), "{}", err);
    }

    #[test]
    fn test_reduce_drops_last_dimension() {
        assert_eq!(shape_of("reduce(mkArray(2, 3, 4))"), Shape::new(vec![3]));
        assert_eq!(shape_of("reduce(mkArray(1, 5))"), Shape::new(vec![]));
    }

    #[test]
    fn test_reduce_of_zero_dimensional_fails() {
        let err = analyze("reduce(reduce(mkArray(1, 5)))").unwrap_err();
        assert!(matches!(err, CompileError::ShapeError { .. }));
    }

    #[test]
    fn test_number_is_scalar() {
        assert_eq!(shape_of("7"), Shape::scalar());
    }

    #[test]
    fn test_every_node_is_typed() {
        let (_, table) = analyze("assign a = mkArray(1, 3); print(add(a, a));").unwrap();
        // mkArray + 2 literals, print + add + 2 variables
        assert_eq!(table.len(), 7);
    }

    #[test]
    fn test_variable_resolves_to_latest_assignment() {
        let source = "assign x = mkArray(1, 2); assign y = x; assign x = mkArray(2, 3, 4); print(x);";
        let (program, table) = analyze(source).unwrap();
        assert_eq!(table.variable("y"), Some(&Shape::new(vec![2])));
        assert_eq!(table.variable("x"), Some(&Shape::new(vec![3, 4])));
        let print = program.statements[3].value();
        assert_eq!(table.get(print.id), Some(&Shape::new(vec![3, 4])));
    }

    #[test]
    fn test_add_shape_mismatch() {
        let err = analyze("assign a = mkArray(1,2); assign b = mkArray(1,3); add(a,b);").unwrap_err();
        match err {
            CompileError::ShapeMismatch { call, expected, got } => {
                assert_eq!(call, "add(a, b)");
                assert_eq!(expected, "[2]");
                assert_eq!(got, "[3]");
            }
            other => panic!("Expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_sub_matching_shapes() {
        assert_eq!(
            shape_of("sub(mkArray(2, 2, 2), mkArray(2, 2, 2))"),
            Shape::new(vec![2, 2])
        );
    }

    #[test]
    fn test_undefined_variable() {
        let err = analyze("print(x); assign x = 1;").unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable { name } if name == "x"));
    }

    #[test]
    fn test_mk_array_dimension_count_checked() {
        assert!(matches!(
            analyze("mkArray(3, 1, 2)").unwrap_err(),
            CompileError::ShapeError { .. }
        ));
        assert!(matches!(
            analyze("mkArray(1, 2, 3)").unwrap_err(),
            CompileError::ShapeError { .. }
        ));
        assert!(analyze("mkArray()").is_err());
    }

    #[test]
    fn test_mk_array_requires_positive_literals() {
        assert!(analyze("mkArray(1, 0)").is_err());
        assert!(analyze("mkArray(1, -3)").is_err());
        assert!(analyze("assign n = 3; mkArray(1, n)").is_err());
    }

    #[test]
    fn test_pass_through_takes_first_argument() {
        assert_eq!(shape_of("print(mkArray(1, 4), 9)"), Shape::new(vec![4]));
        assert!(analyze("print()").is_err());
    }

    #[test]
    fn test_builtin_arity() {
        assert!(analyze("add(1)").is_err());
        assert!(analyze("reduce(1, 2)").is_err());
    }
}
