use std::collections::BTreeSet;
use std::sync::Arc;

use latent_session::SessionAssociation;
use latent_types::{ManagedEntity, Value};

use crate::error::InterceptResult;
use crate::grouped::GroupedAttributeLoader;
use crate::interceptor::AttributeInterceptor;
use crate::surrogate::SurrogateInitializer;

/// The interceptor installed on one managed object.
#[derive(Debug)]
pub enum EntityInterceptor {
    Surrogate(SurrogateInitializer),
    Grouped(GroupedAttributeLoader),
}

impl EntityInterceptor {
    pub fn as_surrogate(&self) -> Option<&SurrogateInitializer> {
        match self {
            Self::Surrogate(s) => Some(s),
            Self::Grouped(_) => None,
        }
    }

    pub fn as_grouped(&self) -> Option<&GroupedAttributeLoader> {
        match self {
            Self::Grouped(g) => Some(g),
            Self::Surrogate(_) => None,
        }
    }

    pub fn as_grouped_mut(&mut self) -> Option<&mut GroupedAttributeLoader> {
        match self {
            Self::Grouped(g) => Some(g),
            Self::Surrogate(_) => None,
        }
    }

    /// What should be installed after the last callback: an initialized
    /// surrogate hands over to a grouped loader, or to nothing.
    pub fn succession(self) -> Option<EntityInterceptor> {
        match self {
            Self::Surrogate(s) if s.is_initialized() => s.into_grouped_loader().map(Self::Grouped),
            other => Some(other),
        }
    }

    fn inner(&self) -> &dyn AttributeInterceptor {
        match self {
            Self::Surrogate(s) => s,
            Self::Grouped(g) => g,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AttributeInterceptor {
        match self {
            Self::Surrogate(s) => s,
            Self::Grouped(g) => g,
        }
    }
}

impl From<SurrogateInitializer> for EntityInterceptor {
    fn from(s: SurrogateInitializer) -> Self {
        Self::Surrogate(s)
    }
}

impl From<GroupedAttributeLoader> for EntityInterceptor {
    fn from(g: GroupedAttributeLoader) -> Self {
        Self::Grouped(g)
    }
}

impl AttributeInterceptor for EntityInterceptor {
    fn entity_name(&self) -> &str {
        self.inner().entity_name()
    }

    fn handle_read(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        value: Value,
    ) -> InterceptResult<Value> {
        self.inner_mut().handle_read(target, attribute, value)
    }

    fn handle_write(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: Value,
        new: Value,
    ) -> InterceptResult<Value> {
        self.inner_mut().handle_write(target, attribute, old, new)
    }

    fn attribute_initialized(&mut self, attribute: &str) -> InterceptResult<()> {
        self.inner_mut().attribute_initialized(attribute)
    }

    fn is_attribute_loaded(&self, attribute: &str) -> bool {
        self.inner().is_attribute_loaded(attribute)
    }

    fn has_any_uninitialized_attributes(&self) -> bool {
        self.inner().has_any_uninitialized_attributes()
    }

    fn initialized_lazy_attribute_names(&self) -> BTreeSet<String> {
        self.inner().initialized_lazy_attribute_names()
    }

    fn association(&self) -> &Arc<SessionAssociation> {
        self.inner().association()
    }

    fn set_association(&mut self, association: Arc<SessionAssociation>) {
        self.inner_mut().set_association(association);
    }
}
