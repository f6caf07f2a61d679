use std::fmt;
use std::sync::Arc;

use latent_session::{FactoryId, SessionAssociation, UnitOfWork};
use latent_types::{AttributeValue, ManagedEntity, Value};
use tracing::debug;

use crate::dispatch::EntityInterceptor;
use crate::error::InterceptResult;
use crate::interceptor::AttributeInterceptor;

/// A managed object together with its interceptor.
///
/// Every attribute access goes through the installed interceptor, if any.
/// Once an interceptor has nothing left to do it is replaced by its
/// successor or removed, after which accesses hit the entity's storage
/// directly.
pub struct Enhanced<E> {
    entity: E,
    interceptor: Option<EntityInterceptor>,
}

impl<E: ManagedEntity> Enhanced<E> {
    /// A fully loaded object; nothing is intercepted.
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            interceptor: None,
        }
    }

    pub fn intercepted(entity: E, interceptor: impl Into<EntityInterceptor>) -> Self {
        Self {
            entity,
            interceptor: Some(interceptor.into()),
        }
    }

    /// The raw storage, bypassing interception.
    pub fn entity(&self) -> &E {
        &self.entity
    }

    pub fn into_entity(self) -> E {
        self.entity
    }

    pub fn interceptor(&self) -> Option<&EntityInterceptor> {
        self.interceptor.as_ref()
    }

    pub fn interceptor_mut(&mut self) -> Option<&mut EntityInterceptor> {
        self.interceptor.as_mut()
    }

    pub fn is_intercepted(&self) -> bool {
        self.interceptor.is_some()
    }

    /// Read an attribute, loading it first if needed.
    pub fn get(&mut self, attribute: &str) -> InterceptResult<Value> {
        let current = self.entity.get(attribute).cloned().unwrap_or_default();
        let Some(interceptor) = self.interceptor.as_mut() else {
            return Ok(current);
        };
        let value = interceptor.handle_read(&mut self.entity, attribute, current);
        self.advance();
        value
    }

    /// Write an attribute and mark it dirty when the value changes.
    pub fn set(&mut self, attribute: &str, value: impl Into<Value>) -> InterceptResult<()> {
        let new = value.into();
        let old = self.entity.get(attribute).cloned().unwrap_or_default();
        let stored = match self.interceptor.as_mut() {
            Some(interceptor) => {
                let stored = interceptor.handle_write(&mut self.entity, attribute, old.clone(), new);
                self.advance();
                stored?
            }
            None => new,
        };
        if stored != old {
            if let Some(tracker) = self.entity.dirty_tracker_mut() {
                tracker.track_change(attribute);
            }
        }
        self.entity.set(attribute, stored);
        Ok(())
    }

    pub fn read<T: AttributeValue>(&mut self, attribute: &str) -> InterceptResult<T> {
        Ok(T::from_value(self.get(attribute)?)?)
    }

    pub fn write<T: AttributeValue>(&mut self, attribute: &str, value: T) -> InterceptResult<()> {
        self.set(attribute, value.into_value())
    }

    /// Tell the interceptor `attribute` was made valid from outside.
    pub fn attribute_initialized(&mut self, attribute: &str) -> InterceptResult<()> {
        match self.interceptor.as_mut() {
            Some(interceptor) => interceptor.attribute_initialized(attribute),
            None => Ok(()),
        }
    }

    pub fn is_attribute_loaded(&self, attribute: &str) -> bool {
        self.interceptor
            .as_ref()
            .map_or(true, |i| i.is_attribute_loaded(attribute))
    }

    pub fn has_any_uninitialized_attributes(&self) -> bool {
        self.interceptor
            .as_ref()
            .is_some_and(|i| i.has_any_uninitialized_attributes())
    }

    pub fn set_session(&mut self, session: Arc<dyn UnitOfWork>) {
        if let Some(interceptor) = self.interceptor.as_mut() {
            interceptor.set_session(session);
        }
    }

    /// Share an existing marker, as every entity loaded by one session does.
    pub fn set_association(&mut self, association: Arc<SessionAssociation>) {
        if let Some(interceptor) = self.interceptor.as_mut() {
            interceptor.set_association(association);
        }
    }

    pub fn unset_session(&mut self) {
        if let Some(interceptor) = self.interceptor.as_mut() {
            interceptor.unset_session();
        }
    }

    pub fn linked_session(&self) -> Option<&Arc<dyn UnitOfWork>> {
        self.interceptor.as_ref().and_then(|i| i.linked_session())
    }

    pub fn allow_load_outside_transaction(&self) -> bool {
        self.interceptor
            .as_ref()
            .is_some_and(|i| i.allow_load_outside_transaction())
    }

    pub fn factory_id(&self) -> Option<FactoryId> {
        self.interceptor.as_ref().and_then(|i| i.factory_id())
    }

    fn advance(&mut self) {
        let Some(current) = self.interceptor.take() else {
            return;
        };
        let was_surrogate = current.as_surrogate().is_some();
        self.interceptor = current.succession();
        if was_surrogate {
            match &self.interceptor {
                Some(EntityInterceptor::Grouped(_)) => {
                    debug!(entity = self.entity.entity_name(), "surrogate replaced by grouped loader")
                }
                None => debug!(entity = self.entity.entity_name(), "surrogate removed"),
                Some(EntityInterceptor::Surrogate(_)) => {}
            }
        }
    }
}

impl<E: ManagedEntity + fmt::Debug> fmt::Debug for Enhanced<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enhanced")
            .field("entity", &self.entity)
            .field("interceptor", &self.interceptor)
            .finish()
    }
}
