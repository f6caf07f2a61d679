//! Per-entity-type runtime metadata for Latent.
//!
//! Everything in this crate is computed once, when the [`Metamodel`] is
//! built from the boot-time [`EntityMapping`]s, and is immutable afterwards.
//! Descriptors are shared (behind `Arc`) by every managed instance of a type
//! and may be read from any thread.
//!
//! # Key Types
//!
//! - [`EntityRelatedState`]: identifier/collection attribute names and the
//!   write policy of an entity type
//! - [`FetchGroupMetadata`]: lazy attributes grouped into fetch groups
//! - [`CallbackTable`]: lifecycle callbacks indexed by [`CallbackKind`]
//! - [`Metamodel`]: arena of [`EntityDescriptor`]s indexed by [`EntityTypeId`]

pub mod callbacks;
pub mod config;
pub mod error;
pub mod fetch_group;
pub mod mapping;
pub mod metamodel;
pub mod related_state;

pub use callbacks::{Callback, CallbackKind, CallbackTable};
pub use config::LazyLoadingConfig;
pub use error::{MetaError, MetaResult};
pub use fetch_group::{include_in_base_fetch_group, FetchGroupMetadata, LazyAttributeDescriptor};
pub use mapping::{AttributeKind, AttributeMapping, EntityMapping, IdentifierMapping, MappingDocument};
pub use metamodel::{EntityDescriptor, EntityTypeId, Metamodel, MetamodelBuilder};
pub use related_state::EntityRelatedState;
