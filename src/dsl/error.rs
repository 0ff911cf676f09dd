//! Compile-time and evaluation-time errors

use thiserror::Error;

/// What went wrong while turning formula text into an AST
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyntaxError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("malformed field reference '{0}'")]
    InvalidFieldRef(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unexpected end of formula, expected {0}")]
    UnexpectedEnd(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function {0}()")]
    UnknownFunction(String),

    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
}

/// A formula that could not be compiled
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Failed to compile formula `{formula}`: {kind} (at offset {position})")]
pub struct CompileError {
    pub formula: String,
    pub position: usize,
    pub kind: SyntaxError,
}

impl CompileError {
    pub(crate) fn new(formula: &str, position: usize, kind: SyntaxError) -> Self {
        Self {
            formula: formula.to_string(),
            position,
            kind,
        }
    }
}

/// A formula that compiled but failed against a particular record
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("Invalid {target} cast for value {value}")]
    Cast { target: String, value: String },

    #[error("Unsupported cast type: {0}")]
    UnsupportedCastType(String),

    #[error("{function}(): {message}")]
    Function {
        function: &'static str,
        message: String,
    },
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
