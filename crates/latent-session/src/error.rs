use std::fmt;

use latent_types::EntityKey;

use crate::registry::{FactoryId, SessionId};

/// Why no unit of work could be found for a lazy load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyInitCause {
    /// No session was ever attached.
    NoSession,
    /// The attached session is closed.
    ClosedSession,
    /// The attached session is open but has no connection.
    DisconnectedSession,
    /// Loading outside the session is allowed but the factory id is unknown.
    NoFactoryId,
    /// The remembered factory is no longer registered.
    FactoryNotRegistered,
}

impl fmt::Display for LazyInitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NoSession => "no session and settings disallow loading outside the session",
            Self::ClosedSession => "session is closed and settings disallow loading outside the session",
            Self::DisconnectedSession => {
                "session is disconnected and settings disallow loading outside the session"
            }
            Self::NoFactoryId => "session factory id could not be determined",
            Self::FactoryNotRegistered => "session factory is no longer registered",
        };
        f.write_str(reason)
    }
}

/// Errors from session, factory, and persister operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No usable unit of work for a lazy load.
    #[error("unable to perform requested lazy initialization [{entity}.{attribute}] - {cause}")]
    LazyInitialization {
        cause: LazyInitCause,
        entity: String,
        attribute: String,
    },

    #[error("session {0} is closed")]
    Closed(SessionId),

    #[error("session {0} is disconnected")]
    Disconnected(SessionId),

    #[error("a transaction is already active on session {0}")]
    TransactionAlreadyActive(SessionId),

    #[error("no active transaction on session {0}")]
    NoActiveTransaction(SessionId),

    #[error("session factory {0} is closed")]
    FactoryClosed(FactoryId),

    #[error("no persister for entity '{0}'")]
    UnknownPersister(String),

    #[error("no row stored for {0}")]
    RowNotFound(EntityKey),

    #[error("entity '{entity}' has no attribute '{attribute}'")]
    UnknownAttribute { entity: String, attribute: String },

    /// Failure reported by the storage backend.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn lazy_initialization(
        cause: LazyInitCause,
        entity: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::LazyInitialization {
            cause,
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
