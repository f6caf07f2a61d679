//! Unit-of-work plumbing for lazy loading in Latent.
//!
//! The interception engine never owns a storage connection. Whenever it must
//! load something it asks the resource broker ([`perform_work`]) for a usable
//! unit of work: the one its [`SessionAssociation`] points at if that is
//! still open and connected, otherwise (when the factory allows loading
//! outside a transaction) a short-lived temporary one that is torn down
//! before the call returns.
//!
//! # Contracts
//!
//! - [`UnitOfWork`]: an open session against the store
//! - [`SessionFactory`]: opens sessions; resolvable by [`FactoryId`]
//! - [`EntityPersister`]: the two loads the engine needs
//!
//! # Backends
//!
//! - [`InMemorySessionFactory`]: `HashMap`-backed store for tests, demos,
//!   and embedding, with load statistics and fault injection

pub mod association;
pub mod broker;
pub mod config;
pub mod error;
pub mod memory;
pub mod registry;
pub mod traits;

pub use association::SessionAssociation;
pub use broker::{perform_work, perform_work_with};
pub use config::{FlushMode, SessionFactoryOptions, SessionOptions, TransactionModel};
pub use error::{LazyInitCause, SessionError, SessionResult};
pub use memory::{
    FaultInjection, InMemoryPersister, InMemorySession, InMemorySessionFactory, LoadCounts,
    LoadEvent,
};
pub use registry::{FactoryId, FactoryRegistry, SessionId};
pub use traits::{EntityPersister, SessionFactory, UnitOfWork};
