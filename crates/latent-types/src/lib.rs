//! Foundation types for Latent.
//!
//! Every other Latent crate depends on `latent-types`. It defines the value
//! model that flows through attribute interception and the storage contract
//! a managed object exposes to the runtime.
//!
//! # Key Types
//!
//! - [`Value`]: Dynamically typed attribute value
//! - [`CollectionValue`]: Collection-valued attribute with its own laziness flag
//! - [`Identifier`]: Simple or composite entity identifier
//! - [`EntityKey`]: Entity name plus identifier, unique per managed instance
//! - [`ManagedEntity`]: Raw attribute storage of a managed object
//! - [`DirtyTracker`]: In-place dirty tracking for self-tracking entities
//! - [`DynamicEntity`]: Map-backed [`ManagedEntity`] implementation

pub mod entity;
pub mod error;
pub mod identity;
pub mod value;

pub use entity::{DirtyTracker, DynamicEntity, ManagedEntity};
pub use error::TypeError;
pub use identity::{EntityKey, Identifier};
pub use value::{AttributeValue, CollectionValue, Value};
