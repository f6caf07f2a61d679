use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use latent_types::ManagedEntity;
use tracing::debug;

use crate::callbacks::{CallbackKind, CallbackTable};
use crate::config::LazyLoadingConfig;
use crate::error::{MetaError, MetaResult};
use crate::fetch_group::FetchGroupMetadata;
use crate::mapping::{EntityMapping, MappingDocument};
use crate::related_state::EntityRelatedState;

/// Index of an entity type in the [`Metamodel`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(u32);

impl EntityTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-type:{}", self.0)
    }
}

/// Runtime descriptor of one entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    id: EntityTypeId,
    mapping: EntityMapping,
    related_state: Arc<EntityRelatedState>,
    fetch_groups: Arc<FetchGroupMetadata>,
    callbacks: CallbackTable,
}

impl EntityDescriptor {
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.mapping.name
    }

    pub fn mapping(&self) -> &EntityMapping {
        &self.mapping
    }

    pub fn related_state(&self) -> &Arc<EntityRelatedState> {
        &self.related_state
    }

    pub fn fetch_groups(&self) -> &Arc<FetchGroupMetadata> {
        &self.fetch_groups
    }

    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }
}

/// Arena of entity descriptors, built once at startup.
#[derive(Debug, Default)]
pub struct Metamodel {
    config: LazyLoadingConfig,
    entities: Vec<Arc<EntityDescriptor>>,
    by_name: HashMap<String, EntityTypeId>,
}

impl Metamodel {
    pub fn builder(config: LazyLoadingConfig) -> MetamodelBuilder {
        MetamodelBuilder::new(config)
    }

    /// Build directly from a parsed mapping document.
    pub fn from_document(document: &MappingDocument) -> MetaResult<Self> {
        let mut builder = MetamodelBuilder::new(document.lazy.clone());
        for mapping in &document.entities {
            builder = builder.entity(mapping.clone());
        }
        builder.build()
    }

    pub fn config(&self) -> &LazyLoadingConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn id_of(&self, entity_name: &str) -> Option<EntityTypeId> {
        self.by_name.get(entity_name).copied()
    }

    pub fn get(&self, id: EntityTypeId) -> Option<&Arc<EntityDescriptor>> {
        self.entities.get(id.index())
    }

    /// Look up a descriptor by entity name.
    pub fn descriptor(&self, entity_name: &str) -> MetaResult<&Arc<EntityDescriptor>> {
        self.id_of(entity_name)
            .and_then(|id| self.get(id))
            .ok_or_else(|| MetaError::UnknownEntity(entity_name.to_string()))
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entities.iter()
    }
}

/// Collects mappings and callbacks, then freezes them into a [`Metamodel`].
pub struct MetamodelBuilder {
    config: LazyLoadingConfig,
    mappings: Vec<EntityMapping>,
    callbacks: HashMap<String, CallbackTable>,
}

impl MetamodelBuilder {
    pub fn new(config: LazyLoadingConfig) -> Self {
        Self {
            config,
            mappings: Vec::new(),
            callbacks: HashMap::new(),
        }
    }

    pub fn entity(mut self, mapping: EntityMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// Register a lifecycle callback for an entity type.
    pub fn callback<F>(mut self, entity_name: &str, kind: CallbackKind, callback: F) -> Self
    where
        F: Fn(&mut dyn ManagedEntity) + Send + Sync + 'static,
    {
        self.callbacks
            .entry(entity_name.to_string())
            .or_default()
            .register(kind, Arc::new(callback));
        self
    }

    pub fn build(mut self) -> MetaResult<Metamodel> {
        let mut entities = Vec::with_capacity(self.mappings.len());
        let mut by_name = HashMap::with_capacity(self.mappings.len());

        for mapping in self.mappings {
            mapping.validate()?;
            if by_name.contains_key(&mapping.name) {
                return Err(MetaError::DuplicateEntity(mapping.name));
            }

            let index = u32::try_from(entities.len())
                .map_err(|_| MetaError::Config("too many entity types".into()))?;
            let id = EntityTypeId(index);

            let descriptor = EntityDescriptor {
                id,
                related_state: Arc::new(EntityRelatedState::from_mapping(&mapping)),
                fetch_groups: Arc::new(FetchGroupMetadata::from_mapping(&mapping, &self.config)),
                callbacks: self.callbacks.remove(&mapping.name).unwrap_or_default(),
                mapping,
            };

            debug!(entity = %descriptor.name(), %id, "registered entity type");
            by_name.insert(descriptor.name().to_string(), id);
            entities.push(Arc::new(descriptor));
        }

        if let Some(orphan) = self.callbacks.keys().next() {
            return Err(MetaError::UnknownEntity(orphan.clone()));
        }

        Ok(Metamodel {
            config: self.config,
            entities,
            by_name,
        })
    }
}
