use std::sync::Arc;

use latent_types::{EntityKey, ManagedEntity, Value};

use crate::config::{SessionFactoryOptions, SessionOptions};
use crate::error::SessionResult;
use crate::registry::{FactoryId, SessionId};

/// An open unit of work against the store.
///
/// Only the handful of capabilities lazy loading needs are part of this
/// contract. Implementations use interior mutability: sessions are shared
/// behind `Arc` by every association marker that points at them.
pub trait UnitOfWork: Send + Sync {
    fn id(&self) -> SessionId;

    /// Id of the owning factory, if it can be determined.
    fn factory_id(&self) -> Option<FactoryId>;

    /// Settings of the owning factory.
    fn factory_options(&self) -> SessionFactoryOptions;

    fn options(&self) -> SessionOptions;

    fn is_open(&self) -> bool;

    fn is_connected(&self) -> bool;

    fn is_transaction_active(&self) -> bool;

    fn begin_transaction(&self) -> SessionResult<()>;

    fn commit(&self) -> SessionResult<()>;

    fn rollback(&self) -> SessionResult<()>;

    /// Close the session. A session reports closed afterwards even when
    /// closing reported an error.
    fn close(&self) -> SessionResult<()>;

    /// Persister for an entity type.
    fn persister(&self, entity_name: &str) -> SessionResult<Arc<dyn EntityPersister>>;

    /// Make the session aware of an entity it did not load itself, as a
    /// read-only entry. Used before loading through a temporary session.
    fn register_read_only(&self, key: &EntityKey) -> SessionResult<()>;
}

/// Opens sessions.
pub trait SessionFactory: Send + Sync {
    fn id(&self) -> FactoryId;

    fn options(&self) -> SessionFactoryOptions;

    fn is_closed(&self) -> bool;

    fn open_session(&self, options: SessionOptions) -> SessionResult<Arc<dyn UnitOfWork>>;
}

/// Storage-side loads used by the interception engine.
pub trait EntityPersister: Send + Sync {
    fn entity_name(&self) -> &str;

    /// Load the base state of an identity-only surrogate into `target`.
    ///
    /// Writes every base-fetch-group attribute (and the identifier
    /// attributes) of the entity identified by `key`. Lazy fetch groups are
    /// left untouched.
    fn initialize_enhanced_entity_used_as_proxy(
        &self,
        target: &mut dyn ManagedEntity,
        key: &EntityKey,
        triggering_attribute: &str,
        session: &dyn UnitOfWork,
    ) -> SessionResult<()>;

    /// Load the fetch group containing `attribute` into `target` and return
    /// the loaded value of `attribute`.
    fn initialize_lazy_property(
        &self,
        attribute: &str,
        target: &mut dyn ManagedEntity,
        key: &EntityKey,
        session: &dyn UnitOfWork,
    ) -> SessionResult<Value>;
}
