//! Fetch-group metadata.
//!
//! Splits the attributes of an entity type into the base fetch group (loaded
//! with the entity) and named lazy fetch groups (each loaded in one round
//! trip on first access to any of its members).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::config::LazyLoadingConfig;
use crate::mapping::{AttributeKind, AttributeMapping, EntityMapping};

/// One lazily loaded attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LazyAttributeDescriptor {
    name: String,
    attribute_index: usize,
    lazy_index: usize,
    fetch_group_name: String,
    kind: AttributeKind,
}

impl LazyAttributeDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position among all non-identifier attributes of the entity.
    pub fn attribute_index(&self) -> usize {
        self.attribute_index
    }

    /// Position among the lazy attributes only.
    pub fn lazy_index(&self) -> usize {
        self.lazy_index
    }

    pub fn fetch_group_name(&self) -> &str {
        &self.fetch_group_name
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }
}

/// Decide whether an attribute is loaded with the entity's base state.
pub fn include_in_base_fetch_group(
    attribute: &AttributeMapping,
    enhanced: bool,
    config: &LazyLoadingConfig,
) -> bool {
    if !enhanced {
        if attribute.kind == AttributeKind::ToOne && attribute.lazy {
            debug!(
                attribute = %attribute.name,
                "to-one attribute mapped lazy but the entity type is not enhanced"
            );
        }
        return true;
    }

    match attribute.kind {
        AttributeKind::ToOne => {
            if !attribute.lazy {
                return true;
            }
            // A surrogate can be built from the foreign key unless there is
            // no key column to build it from.
            config.allow_enhancement_as_proxy && !attribute.shares_primary_key
        }
        AttributeKind::Collection => config.collections_in_default_fetch_group,
        AttributeKind::Basic => !attribute.lazy,
    }
}

fn fetch_group_name(attribute: &AttributeMapping, config: &LazyLoadingConfig) -> String {
    if let Some(group) = &attribute.lazy_group {
        return group.clone();
    }
    if attribute.is_association() {
        attribute.name.clone()
    } else {
        config.default_fetch_group.clone()
    }
}

/// Lazy attributes of one entity type, indexed by name and by fetch group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchGroupMetadata {
    entity_name: String,
    enhanced: bool,
    descriptors: Vec<LazyAttributeDescriptor>,
    by_name: HashMap<String, usize>,
    groups: BTreeMap<String, Vec<usize>>,
    lazy_attribute_names: Arc<BTreeSet<String>>,
}

impl FetchGroupMetadata {
    /// Compute the fetch groups of an entity type.
    pub fn from_mapping(mapping: &EntityMapping, config: &LazyLoadingConfig) -> Self {
        let mut descriptors = Vec::new();
        let mut by_name = HashMap::new();
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (attribute_index, attribute) in mapping.attributes.iter().enumerate() {
            if include_in_base_fetch_group(attribute, mapping.enhanced, config) {
                continue;
            }

            let lazy_index = descriptors.len();
            let descriptor = LazyAttributeDescriptor {
                name: attribute.name.clone(),
                attribute_index,
                lazy_index,
                fetch_group_name: fetch_group_name(attribute, config),
                kind: attribute.kind,
            };
            groups
                .entry(descriptor.fetch_group_name.clone())
                .or_default()
                .push(lazy_index);
            by_name.insert(descriptor.name.clone(), lazy_index);
            descriptors.push(descriptor);
        }

        let lazy_attribute_names = Arc::new(descriptors.iter().map(|d| d.name.clone()).collect());

        debug!(
            entity = %mapping.name,
            lazy_attributes = descriptors.len(),
            fetch_groups = groups.len(),
            "computed fetch groups"
        );

        Self {
            entity_name: mapping.name.clone(),
            enhanced: mapping.enhanced,
            descriptors,
            by_name,
            groups,
            lazy_attribute_names,
        }
    }

    /// Metadata for an entity type without lazy attributes.
    pub fn non_lazy(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            enhanced: false,
            descriptors: Vec::new(),
            by_name: HashMap::new(),
            groups: BTreeMap::new(),
            lazy_attribute_names: Arc::new(BTreeSet::new()),
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn is_enhanced(&self) -> bool {
        self.enhanced
    }

    pub fn has_lazy_attributes(&self) -> bool {
        !self.descriptors.is_empty()
    }

    pub fn is_lazy_attribute(&self, attribute: &str) -> bool {
        self.by_name.contains_key(attribute)
    }

    /// Lazy attributes in attribute order.
    pub fn descriptors(&self) -> &[LazyAttributeDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, attribute: &str) -> Option<&LazyAttributeDescriptor> {
        self.by_name.get(attribute).map(|&i| &self.descriptors[i])
    }

    /// Shared set of lazy attribute names. Cloning the `Arc` is the only
    /// per-instance cost of handing it to an interceptor.
    pub fn lazy_attribute_names(&self) -> &Arc<BTreeSet<String>> {
        &self.lazy_attribute_names
    }

    pub fn fetch_group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Attributes of a fetch group, in attribute order.
    pub fn group(&self, group: &str) -> Vec<&LazyAttributeDescriptor> {
        self.groups
            .get(group)
            .map(|indexes| indexes.iter().map(|&i| &self.descriptors[i]).collect())
            .unwrap_or_default()
    }

    /// Attributes loaded together with `attribute`, itself included.
    ///
    /// Empty when `attribute` is not lazy.
    pub fn group_of(&self, attribute: &str) -> Vec<&LazyAttributeDescriptor> {
        self.descriptor(attribute)
            .map(|d| self.group(d.fetch_group_name()))
            .unwrap_or_default()
    }
}
