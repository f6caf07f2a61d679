use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::traits::SessionFactory;

/// Stable identifier of a session factory.
///
/// Interceptors remember this instead of the factory itself so that a
/// detached entity can still find a live factory to load through.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactoryId(uuid::Uuid);

impl FactoryId {
    /// Generate a new time-ordered factory id (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for FactoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactoryId({})", self.0)
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one session, used in logs and errors.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolves [`FactoryId`]s to live factories.
///
/// A process-wide instance is available through [`FactoryRegistry::global`];
/// separate instances can be used to isolate embedded runtimes.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: RwLock<HashMap<FactoryId, Arc<dyn SessionFactory>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static FactoryRegistry {
        static GLOBAL: OnceLock<FactoryRegistry> = OnceLock::new();
        GLOBAL.get_or_init(FactoryRegistry::new)
    }

    /// Register a factory under its own id, replacing any previous entry.
    pub fn register(&self, factory: Arc<dyn SessionFactory>) -> SessionResult<()> {
        let id = factory.id();
        let mut factories = self
            .factories
            .write()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))?;
        factories.insert(id, factory);
        debug!(factory = %id, "registered session factory");
        Ok(())
    }

    /// Remove a factory. Returns `true` if it was registered.
    pub fn deregister(&self, id: FactoryId) -> SessionResult<bool> {
        let mut factories = self
            .factories
            .write()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))?;
        let removed = factories.remove(&id).is_some();
        if removed {
            debug!(factory = %id, "deregistered session factory");
        }
        Ok(removed)
    }

    pub fn resolve(&self, id: FactoryId) -> SessionResult<Option<Arc<dyn SessionFactory>>> {
        let factories = self
            .factories
            .read()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))?;
        Ok(factories.get(&id).cloned())
    }

    pub fn len(&self) -> usize {
        self.factories.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("factories", &self.len())
            .finish()
    }
}
