use thiserror::Error;

/// Errors produced by value and identity operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer {value} does not fit in {target}")]
    OutOfRange { value: i64, target: &'static str },

    #[error("identifier has no part named '{0}'")]
    UnknownIdentifierPart(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
