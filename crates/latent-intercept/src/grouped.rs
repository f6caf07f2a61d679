//! Per-fetch-group lazy loading.
//!
//! A [`GroupedAttributeLoader`] sits in front of an entity whose base state
//! is loaded but whose lazy attributes are not. The first read of a lazy
//! attribute loads its whole fetch group in one round trip; later reads of
//! any member of that group pass straight through.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use latent_meta::EntityDescriptor;
use latent_session::{perform_work, EntityPersister, SessionAssociation, UnitOfWork};
use latent_types::{EntityKey, ManagedEntity, Value};
use tracing::debug;

use crate::error::{InterceptError, InterceptResult};
use crate::interceptor::AttributeInterceptor;

/// Interceptor of an entity with deferred fetch groups.
pub struct GroupedAttributeLoader {
    entity: Arc<EntityDescriptor>,
    key: EntityKey,
    association: Arc<SessionAssociation>,
    /// Shared with the entity type until a fetch graph widens it.
    lazy_attribute_names: Arc<BTreeSet<String>>,
    initialized: BTreeSet<String>,
}

impl GroupedAttributeLoader {
    /// A loader for an instance whose `initialized` lazy attributes were
    /// already loaded or written.
    pub fn new<I>(
        entity: Arc<EntityDescriptor>,
        key: EntityKey,
        initialized: I,
        association: Arc<SessionAssociation>,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let lazy_attribute_names = Arc::clone(entity.fetch_groups().lazy_attribute_names());
        let initialized = initialized
            .into_iter()
            .filter(|name| lazy_attribute_names.contains(name))
            .collect();
        Self {
            entity,
            key,
            association,
            lazy_attribute_names,
            initialized,
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn lazy_attribute_names(&self) -> &BTreeSet<String> {
        &self.lazy_attribute_names
    }

    /// Whether the lazy attribute set is still the entity type's own.
    pub fn shares_lazy_attribute_names(&self) -> bool {
        Arc::ptr_eq(
            &self.lazy_attribute_names,
            self.entity.fetch_groups().lazy_attribute_names(),
        )
    }

    /// Treat `attribute` as lazy for this instance only, e.g. because a
    /// fetch graph left it out of the initial load.
    ///
    /// The shared set is copied on the first call; later calls reuse the
    /// private copy.
    pub fn add_lazy_attribute_by_graph(&mut self, attribute: &str) -> InterceptResult<()> {
        if self.lazy_attribute_names.contains(attribute) {
            return Ok(());
        }
        if self.entity.mapping().attribute_named(attribute).is_none() {
            return Err(InterceptError::UnknownAttribute {
                entity: self.entity.name().to_string(),
                attribute: attribute.to_string(),
            });
        }
        Arc::make_mut(&mut self.lazy_attribute_names).insert(attribute.to_string());
        Ok(())
    }

    fn is_uninitialized_lazy(&self, attribute: &str) -> bool {
        self.lazy_attribute_names.contains(attribute) && !self.initialized.contains(attribute)
    }

    /// Members of the fetch group `attribute` is loaded with.
    fn group_members(&self, attribute: &str) -> Vec<String> {
        let members: Vec<String> = self
            .entity
            .fetch_groups()
            .group_of(attribute)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        if members.is_empty() {
            vec![attribute.to_string()]
        } else {
            members
        }
    }

    fn load_group(&mut self, target: &mut dyn ManagedEntity, attribute: &str) -> InterceptResult<Value> {
        let members = self.group_members(attribute);
        // Members the caller already set must survive the group load.
        let keep: Vec<(String, Value)> = members
            .iter()
            .filter(|name| self.initialized.contains(name.as_str()))
            .map(|name| (name.clone(), target.get(name).cloned().unwrap_or_default()))
            .collect();

        let entity_name = self.entity.name();
        let key = &self.key;
        let value = perform_work(
            &self.association,
            entity_name,
            attribute,
            |session: &dyn UnitOfWork, temporary| -> InterceptResult<Value> {
                if temporary {
                    session.register_read_only(key)?;
                }
                let persister = session.persister(entity_name)?;
                Ok(persister.initialize_lazy_property(attribute, &mut *target, key, session)?)
            },
        )?;

        for (name, kept) in keep {
            target.set(&name, kept);
        }
        self.initialized.extend(members.iter().cloned());
        self.initialized.insert(attribute.to_string());

        if let Some(collection) = value.as_collection() {
            if let (Some(len), Some(tracker)) = (collection.len(), target.dirty_tracker_mut()) {
                tracker.snapshot_collection_size(attribute, len);
            }
        }

        debug!(key = %self.key, attribute, ?members, "initialized fetch group");
        Ok(value)
    }
}

impl AttributeInterceptor for GroupedAttributeLoader {
    fn entity_name(&self) -> &str {
        self.entity.name()
    }

    fn handle_read(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        value: Value,
    ) -> InterceptResult<Value> {
        if !self.is_uninitialized_lazy(attribute) {
            return Ok(value);
        }
        self.load_group(target, attribute)
    }

    fn handle_write(
        &mut self,
        _target: &mut dyn ManagedEntity,
        attribute: &str,
        _old: Value,
        new: Value,
    ) -> InterceptResult<Value> {
        if self.is_uninitialized_lazy(attribute) {
            self.initialized.insert(attribute.to_string());
        }
        Ok(new)
    }

    fn attribute_initialized(&mut self, attribute: &str) -> InterceptResult<()> {
        if self.lazy_attribute_names.contains(attribute) {
            self.initialized.insert(attribute.to_string());
        }
        Ok(())
    }

    fn is_attribute_loaded(&self, attribute: &str) -> bool {
        !self.is_uninitialized_lazy(attribute)
    }

    fn has_any_uninitialized_attributes(&self) -> bool {
        self.lazy_attribute_names
            .iter()
            .any(|name| !self.initialized.contains(name))
    }

    fn initialized_lazy_attribute_names(&self) -> BTreeSet<String> {
        self.initialized.clone()
    }

    fn association(&self) -> &Arc<SessionAssociation> {
        &self.association
    }

    fn set_association(&mut self, association: Arc<SessionAssociation>) {
        self.association = association;
    }
}

impl fmt::Debug for GroupedAttributeLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedAttributeLoader")
            .field("key", &self.key)
            .field("lazy_attribute_names", &self.lazy_attribute_names)
            .field("initialized", &self.initialized)
            .finish()
    }
}
