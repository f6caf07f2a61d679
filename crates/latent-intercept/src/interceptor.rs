use std::collections::BTreeSet;
use std::sync::Arc;

use latent_session::{FactoryId, SessionAssociation, UnitOfWork};
use latent_types::{AttributeValue, ManagedEntity, Value};

use crate::error::InterceptResult;

/// Per-instance interception of attribute reads and writes.
///
/// Every typed accessor of an enhanced object funnels into
/// [`handle_read`](Self::handle_read) and
/// [`handle_write`](Self::handle_write). `target` is the object's raw
/// storage; an interceptor may load state into it before answering.
pub trait AttributeInterceptor {
    fn entity_name(&self) -> &str;

    /// Value the caller should observe for `attribute`, given the value
    /// currently stored. May trigger a load.
    fn handle_read(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        value: Value,
    ) -> InterceptResult<Value>;

    /// Value that should actually be stored for a write of `new` over `old`.
    fn handle_write(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: Value,
        new: Value,
    ) -> InterceptResult<Value>;

    /// Note that `attribute` became valid without passing through
    /// [`handle_write`](Self::handle_write).
    fn attribute_initialized(&mut self, attribute: &str) -> InterceptResult<()>;

    fn is_attribute_loaded(&self, attribute: &str) -> bool;

    fn has_any_uninitialized_attributes(&self) -> bool;

    fn initialized_lazy_attribute_names(&self) -> BTreeSet<String>;

    /// The marker linking this interceptor to a unit of work.
    fn association(&self) -> &Arc<SessionAssociation>;

    /// Swap in another marker. Markers are shared, never modified.
    fn set_association(&mut self, association: Arc<SessionAssociation>);

    /// Link to `session` through a fresh marker.
    fn set_session(&mut self, session: Arc<dyn UnitOfWork>) {
        self.set_association(SessionAssociation::attach(session));
    }

    /// Drop the session link, keeping the ability to load outside it when
    /// the factory allows that.
    fn unset_session(&mut self) {
        let detached = self.association().detached();
        self.set_association(detached);
    }

    fn linked_session(&self) -> Option<&Arc<dyn UnitOfWork>> {
        self.association().session()
    }

    fn allow_load_outside_transaction(&self) -> bool {
        self.association().allow_load_outside_transaction()
    }

    fn factory_id(&self) -> Option<FactoryId> {
        self.association().factory_id()
    }
}

/// Typed read and write callbacks over [`AttributeInterceptor`].
///
/// Generated accessors call these with the field's current typed value;
/// each converts to [`Value`], goes through the untyped handler, and
/// converts back.
pub trait InterceptorExt: AttributeInterceptor {
    fn read<T: AttributeValue>(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: T,
    ) -> InterceptResult<T> {
        let value = self.handle_read(target, attribute, current.into_value())?;
        Ok(T::from_value(value)?)
    }

    fn write<T: AttributeValue>(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: T,
        new: T,
    ) -> InterceptResult<T> {
        let value = self.handle_write(target, attribute, old.into_value(), new.into_value())?;
        Ok(T::from_value(value)?)
    }

    fn read_boolean(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: bool,
    ) -> InterceptResult<bool> {
        self.read(target, attribute, current)
    }

    fn read_int(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: i32,
    ) -> InterceptResult<i32> {
        self.read(target, attribute, current)
    }

    fn read_long(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: i64,
    ) -> InterceptResult<i64> {
        self.read(target, attribute, current)
    }

    fn read_double(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: f64,
    ) -> InterceptResult<f64> {
        self.read(target, attribute, current)
    }

    fn read_text(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: Option<String>,
    ) -> InterceptResult<Option<String>> {
        self.read(target, attribute, current)
    }

    fn read_object(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        current: Value,
    ) -> InterceptResult<Value> {
        self.handle_read(target, attribute, current)
    }

    fn write_boolean(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: bool,
        new: bool,
    ) -> InterceptResult<bool> {
        self.write(target, attribute, old, new)
    }

    fn write_int(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: i32,
        new: i32,
    ) -> InterceptResult<i32> {
        self.write(target, attribute, old, new)
    }

    fn write_long(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: i64,
        new: i64,
    ) -> InterceptResult<i64> {
        self.write(target, attribute, old, new)
    }

    fn write_double(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: f64,
        new: f64,
    ) -> InterceptResult<f64> {
        self.write(target, attribute, old, new)
    }

    fn write_text(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: Option<String>,
        new: Option<String>,
    ) -> InterceptResult<Option<String>> {
        self.write(target, attribute, old, new)
    }

    fn write_object(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: Value,
        new: Value,
    ) -> InterceptResult<Value> {
        self.handle_write(target, attribute, old, new)
    }
}

impl<I: AttributeInterceptor + ?Sized> InterceptorExt for I {}
