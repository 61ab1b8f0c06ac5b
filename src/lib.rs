//! MiniAPL compile-and-run pipeline
//!
//! This library compiles programs in a small array language into a
//! translation unit and runs it immediately on an execution engine.
//!
//! # Example
//!
//! ```rust
//! use miniapl::{compile_and_run, RunOptions, VirtualMachine};
//!
//! let mut vm = VirtualMachine::create(Vec::new()).unwrap();
//! let source = "assign x = mkArray(1, 3); print(x);";
//! compile_and_run(source, "demo", &mut vm, &RunOptions::default()).unwrap();
//! assert_eq!(vm.into_output(), b"[0, 0, 0]\n");
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod analyzer;
pub mod codegen;
pub mod ir;
pub mod passes;
pub mod engine;
pub mod error;

pub use ast::*;
pub use parser::Parser;
pub use analyzer::{Analyzer, ShapeTable};
pub use codegen::CodeGenerator;
pub use ir::{Instruction, TranslationUnit};
pub use passes::{OptLevel, PassManager};
pub use engine::{EntryPoint, ExecutionEngine, VirtualMachine};
pub use error::{CompileError, CompileResult, EngineError, EngineResult};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Symbol the generated program is entered through
pub const DEFAULT_ENTRY_SYMBOL: &str = "main";

/// Settings for running a compiled program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Verify the optimized translation unit before handing it to the engine
    pub debug: bool,
    pub opt_level: OptLevel,
    pub entry_symbol: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            debug: false,
            opt_level: OptLevel::default(),
            entry_symbol: DEFAULT_ENTRY_SYMBOL.to_string(),
        }
    }
}

/// Compile source text into a translation unit whose entry function is `entry_symbol`
pub fn compile(source: &str, unit_name: &str, entry_symbol: &str) -> CompileResult<TranslationUnit> {
    // Parse the program
    let mut parser = Parser::new(source);
    let program = parser.parse_program()?;
    debug!(statements = program.statements.len(), "parsed program");

    // Infer every shape before generating anything
    let shapes = Analyzer::new().analyze(&program)?;
    debug!(nodes = shapes.len(), "inferred shapes");

    let unit = CodeGenerator::new(&shapes, entry_symbol).generate(&program, unit_name)?;
    debug!(instructions = unit.instruction_count(), "generated translation unit");

    Ok(unit)
}

/// Optimize a translation unit, link it into `engine` and invoke its entry symbol
pub fn run<E: ExecutionEngine>(
    mut unit: TranslationUnit,
    engine: &mut E,
    options: &RunOptions,
) -> CompileResult<()> {
    PassManager::new(options.opt_level).run(&mut unit, engine.target_triple());
    debug!(instructions = unit.instruction_count(), "optimized translation unit");

    // Verify exactly what the engine will link
    if options.debug {
        unit.verify()?;
        debug!("verified translation unit");
    }

    engine.add_module(unit)?;
    let entry = engine.lookup(&options.entry_symbol)?;
    engine.invoke(entry)?;
    debug!(symbol = %options.entry_symbol, "entry symbol returned");

    Ok(())
}

/// Main pipeline: compile `source` and run it on `engine`
pub fn compile_and_run<E: ExecutionEngine>(
    source: &str,
    unit_name: &str,
    engine: &mut E,
    options: &RunOptions,
) -> CompileResult<()> {
    let unit = compile(source, unit_name, &options.entry_symbol)?;
    run(unit, engine, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn execute_with(source: &str, options: &RunOptions) -> CompileResult<String> {
        let mut vm = VirtualMachine::create(Vec::new())?;
        compile_and_run(source, "test", &mut vm, options)?;
        Ok(String::from_utf8_lossy(&vm.into_output()).into_owned())
    }

    fn execute(source: &str) -> CompileResult<String> {
        execute_with(source, &RunOptions::default())
    }

    #[test]
    fn test_print_zero_array() {
        let output = execute("assign x = mkArray(1, 3); print(x);").unwrap();
        assert_eq!(output, "[0, 0, 0]\n");
    }

    #[test]
    fn test_add_of_zero_arrays() {
        let output = execute("print(add(mkArray(1,3), mkArray(1,3)))").unwrap();
        assert_eq!(output, "[0, 0, 0]\n");
    }

    #[test]
    fn test_scalar_arithmetic() {
        let output = execute("assign a = 40; assign b = add(a, 2); print(b); print(sub(a, b));").unwrap();
        assert_eq!(output, "[42]\n[-2]\n");
    }

    #[test]
    fn test_reduce_output_shapes() {
        let output = execute("print(reduce(mkArray(2, 2, 3))); print(reduce(mkArray(1, 4)));").unwrap();
        assert_eq!(output, "[0, 0]\n0\n");
    }

    #[test]
    fn test_multi_dimensional_print() {
        let output = execute("print(mkArray(3, 2, 1, 2))").unwrap();
        assert_eq!(output, "[[[0, 0]], [[0, 0]]]\n");
    }

    #[test]
    fn test_print_every_argument() {
        let output = execute("assign y = print(7, mkArray(1, 2)); print(y);").unwrap();
        assert_eq!(output, "[7]\n[0, 0]\n[7]\n");
    }

    #[test]
    fn test_shape_mismatch_never_reaches_engine() {
        let mut vm = VirtualMachine::create(Vec::new()).unwrap();
        let source = "assign a = mkArray(1,2); assign b = mkArray(1,3); add(a,b);";
        let err = compile_and_run(source, "test", &mut vm, &RunOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
        assert!(matches!(
            vm.lookup(DEFAULT_ENTRY_SYMBOL),
            Err(EngineError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn test_missing_equals_is_parse_error() {
        let err = execute("assign x 5; print(1);").unwrap_err();
        assert!(matches!(err, CompileError::ParseError { statement: 1, .. }));
    }

    #[test]
    fn test_debug_verification_and_o0() {
        let options = RunOptions {
            debug: true,
            opt_level: OptLevel::O0,
            ..RunOptions::default()
        };
        let output = execute_with("assign unused = mkArray(1, 9); print(5);", &options).unwrap();
        assert_eq!(output, "[5]\n");
    }

    #[test]
    fn test_optimization_preserves_output() {
        let source = "assign a = mkArray(2, 2, 2); assign b = sub(a, a); assign c = 3; print(add(c, c));";
        let o0 = RunOptions {
            opt_level: OptLevel::O0,
            ..RunOptions::default()
        };
        assert_eq!(execute_with(source, &o0).unwrap(), execute(source).unwrap());
    }

    #[test]
    fn test_dead_values_removed_at_o1() {
        let mut unit = compile("assign a = mkArray(1, 3); print(1);", "test", "main").unwrap();
        PassManager::new(OptLevel::O1).run(&mut unit, "t");
        assert_eq!(unit.instruction_count(), 3);
    }

    #[test]
    fn test_debug_verifies_unit_after_passes() {
        let options = RunOptions {
            debug: true,
            ..RunOptions::default()
        };
        let mut unit = compile("print(3)", "test", "main").unwrap();
        // A defect the optimizer leaves in place must stop the run before linking
        unit.functions[0].body.insert(0, Instruction::Print {
            src: ir::Reg(0),
            dims: vec![1],
        });
        let mut vm = VirtualMachine::create(Vec::new()).unwrap();
        let err = run(unit, &mut vm, &options).unwrap_err();
        assert!(matches!(err, CompileError::Engine(EngineError::Verify(_))), "{:?}", err);
        assert!(vm.lookup(DEFAULT_ENTRY_SYMBOL).is_err());
        assert!(vm.output().is_empty());
    }

    #[test]
    fn test_oversized_array_is_shape_error() {
        let err = execute("print(mkArray(2, 2147483647, 2147483647))").unwrap_err();
        assert!(matches!(err, CompileError::ShapeError { .. }), "{:?}", err);

        let err = execute("print(mkArray(3, 2147483647, 2147483647, 2147483647))").unwrap_err();
        assert!(matches!(err, CompileError::ShapeError { .. }), "{:?}", err);
    }

    #[test]
    fn test_unknown_entry_symbol() {
        let options = RunOptions {
            entry_symbol: "start".to_string(),
            ..RunOptions::default()
        };
        let mut vm = VirtualMachine::create(Vec::new()).unwrap();
        let unit = compile("print(1)", "test", "main").unwrap();
        let err = run(unit, &mut vm, &options).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Engine(EngineError::SymbolNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_program_runs() {
        assert_eq!(execute("").unwrap(), "");
    }
}
