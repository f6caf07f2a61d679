use latent_session::SessionError;
use latent_types::{TypeError, Value};

/// Errors raised by attribute interception.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum InterceptError {
    /// A callback reached a surrogate that already finished initializing.
    /// The interceptor should have been replaced; this is a bug in the
    /// caller, not a recoverable condition.
    #[error("interceptor of {entity} is already initialized but received a {operation} of '{attribute}'")]
    AlreadyInitialized {
        entity: String,
        attribute: String,
        operation: &'static str,
    },

    #[error("identifier attribute '{attribute}' of {entity} cannot be changed from {from} to {to}")]
    IdentifierAltered {
        entity: String,
        attribute: String,
        from: Value,
        to: Value,
    },

    #[error("entity '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for interception.
pub type InterceptResult<T> = Result<T, InterceptError>;
