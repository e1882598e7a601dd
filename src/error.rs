//! Error types for the HDL to Go compiler

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
///
/// Every variant aborts the pipeline. Recoverable conditions (a chip defined
/// twice across included files) are reported as [`crate::Diagnostic`]s instead.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexer error at line {line}, column {column}: {message}")]
    Lexer {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Parse error in chip '{chip}' at line {line}: {message}")]
    Parse {
        chip: String,
        line: usize,
        message: String,
    },

    #[error("Malformed chip block at line {line}: {message}")]
    MalformedChipBlock { line: usize, message: String },

    #[error("Malformed include block at line {line}: {message}")]
    MalformedInclude { line: usize, message: String },

    #[error("Include cycle: {chain}")]
    IncludeCycle { chain: String },

    #[error("More than one simulation target: '{first}' and '{second}' are both marked SIM")]
    DuplicateSimulationTarget { first: String, second: String },

    #[error("Semantic error in chip '{chip}': {message}")]
    Semantic { chip: String, message: String },

    #[error("Code generation error: {message}")]
    CodeGen { message: String },

    #[error("Script '{name}' could not be found")]
    ScriptNotFound { name: String },

    #[error("Script '{name}' is empty")]
    EmptyScript { name: String },

    #[error("Script error at line {line}: {message}")]
    Script { line: usize, message: String },

    #[error("Script line {line}: 'call' cannot be used in a clocked simulation")]
    ClockedCallIncompatible { line: usize },

    #[error("Script line {line}: 'dur' declared more than once")]
    DurationRedeclared { line: usize },

    #[error("Clocked script does not declare 'dur'")]
    MissingDuration,

    #[error("Clocked simulation of '{chip}' needs an output destination for its report")]
    MissingOutputDestination { chip: String },

    #[error("Source '{name}' could not be found")]
    SourceNotFound { name: String },

    #[error("Simulation error: {message}")]
    Simulation { message: String },

    #[error("I/O error on '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn parse_error(chip: impl Into<String>, line: usize, msg: impl Into<String>) -> Self {
        CompileError::Parse {
            chip: chip.into(),
            line,
            message: msg.into(),
        }
    }

    pub fn malformed(line: usize, msg: impl Into<String>) -> Self {
        CompileError::MalformedChipBlock {
            line,
            message: msg.into(),
        }
    }

    pub fn semantic(chip: impl Into<String>, msg: impl Into<String>) -> Self {
        CompileError::Semantic {
            chip: chip.into(),
            message: msg.into(),
        }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        CompileError::CodeGen { message: msg.into() }
    }

    pub fn script(line: usize, msg: impl Into<String>) -> Self {
        CompileError::Script {
            line,
            message: msg.into(),
        }
    }

    pub fn simulation(msg: impl Into<String>) -> Self {
        CompileError::Simulation { message: msg.into() }
    }
}
