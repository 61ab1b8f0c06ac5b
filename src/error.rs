//! Error types for the MiniAPL compiler and execution engine

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Result type for execution engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexer error at position {position}: {message}")]
    LexerError { position: usize, message: String },

    #[error("Parser error in statement {statement}: {message}")]
    ParseError { statement: usize, message: String },

    #[error("Shape error in `{call}`: {message}")]
    ShapeError { call: String, message: String },

    #[error("Shape mismatch in `{call}`: expected {expected}, got {got}")]
    ShapeMismatch {
        call: String,
        expected: String,
        got: String,
    },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Code generation error: {message}")]
    CodeGenError { message: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CompileError {
    pub fn parse_error(statement: usize, msg: impl Into<String>) -> Self {
        CompileError::ParseError {
            statement,
            message: msg.into(),
        }
    }

    pub fn shape(call: impl Into<String>, msg: impl Into<String>) -> Self {
        CompileError::ShapeError {
            call: call.into(),
            message: msg.into(),
        }
    }

    pub fn undefined(name: impl Into<String>) -> Self {
        CompileError::UndefinedVariable { name: name.into() }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        CompileError::CodeGenError { message: msg.into() }
    }
}

/// Failures reported by the execution engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unexpected engine initialization failure: {0}")]
    Init(String),

    #[error("verification failed: {0}")]
    Verify(String),

    #[error("unexpected module failure: {0}")]
    Link(String),

    #[error("entry symbol not found: \"{symbol}\"")]
    SymbolNotFound { symbol: String },

    #[error("runtime fault: {0}")]
    Runtime(String),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn verify(msg: impl Into<String>) -> Self {
        EngineError::Verify(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        EngineError::Runtime(msg.into())
    }
}
