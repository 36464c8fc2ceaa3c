//! Errors for lexing, parsing and compiling expressions.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("unexpected token '{found}' at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

pub type ExprResult<T> = Result<T, ExprError>;
