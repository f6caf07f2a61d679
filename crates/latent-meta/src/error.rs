/// Errors produced while building or querying the metamodel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetaError {
    #[error("entity '{0}' is mapped more than once")]
    DuplicateEntity(String),

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("entity '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("invalid mapping for '{entity}': {reason}")]
    InvalidMapping { entity: String, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl MetaError {
    pub(crate) fn invalid(entity: &str, reason: impl Into<String>) -> Self {
        Self::InvalidMapping {
            entity: entity.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for metamodel operations.
pub type MetaResult<T> = Result<T, MetaError>;
