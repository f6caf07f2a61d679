//! Attribute interception and lazy initialization for Latent.
//!
//! Enhanced managed objects route every attribute access through an
//! [`AttributeInterceptor`]. Two interceptors exist:
//!
//! - [`SurrogateInitializer`]: the object's identity is known but none of
//!   its state is loaded. Identifier reads are answered from the key; the
//!   first other read loads the base state and replays writes made before it.
//! - [`GroupedAttributeLoader`]: the base state is loaded and lazy
//!   attributes are fetched one fetch group at a time.
//!
//! Loads go through the resource broker of `latent-session`, so a detached
//! object can still initialize through a temporary session when its factory
//! allows that.
//!
//! [`Enhanced`] pairs a [`ManagedEntity`](latent_types::ManagedEntity) with
//! its [`EntityInterceptor`] and swaps interceptors as initialization
//! progresses.

pub mod dispatch;
pub mod enhanced;
pub mod error;
pub mod grouped;
pub mod interceptor;
pub mod surrogate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use dispatch::EntityInterceptor;
pub use enhanced::Enhanced;
pub use error::{InterceptError, InterceptResult};
pub use grouped::GroupedAttributeLoader;
pub use interceptor::{AttributeInterceptor, InterceptorExt};
pub use surrogate::{LazyStatus, SurrogateInitializer};
