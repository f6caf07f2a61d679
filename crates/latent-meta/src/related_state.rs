use std::collections::BTreeSet;

use crate::mapping::{EntityMapping, IdentifierMapping};

/// Immutable per-entity-type facts an identity-only surrogate needs.
///
/// Built once per entity type and shared by every surrogate of that type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRelatedState {
    entity_name: String,
    identifier_attribute_names: BTreeSet<String>,
    composite_identifier: Option<Vec<String>>,
    collection_attribute_names: BTreeSet<String>,
    in_line_dirty_checking: bool,
    requires_full_init_before_write: bool,
}

impl EntityRelatedState {
    pub fn from_mapping(mapping: &EntityMapping) -> Self {
        let identifier_attribute_names = mapping.identifier.attribute_names().into_iter().collect();
        let composite_identifier = match &mapping.identifier {
            IdentifierMapping::Composite(names) => Some(names.clone()),
            IdentifierMapping::Simple(_) => None,
        };
        let collection_attribute_names = mapping
            .attributes
            .iter()
            .filter(|a| a.is_collection())
            .map(|a| a.name.clone())
            .collect();

        let in_line_dirty_checking = mapping.self_dirty_tracking;
        // A static update statement writes every column, and a versioned row
        // needs its current version, so either way the state must be loaded.
        let requires_full_init_before_write =
            !in_line_dirty_checking || !mapping.dynamic_update || mapping.versioned;

        Self {
            entity_name: mapping.name.clone(),
            identifier_attribute_names,
            composite_identifier,
            collection_attribute_names,
            in_line_dirty_checking,
            requires_full_init_before_write,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn identifier_attribute_names(&self) -> &BTreeSet<String> {
        &self.identifier_attribute_names
    }

    pub fn is_identifier_attribute(&self, attribute: &str) -> bool {
        self.identifier_attribute_names.contains(attribute)
    }

    /// Ordered part names when the identifier is composite.
    pub fn composite_identifier(&self) -> Option<&[String]> {
        self.composite_identifier.as_deref()
    }

    pub fn collection_attribute_names(&self) -> &BTreeSet<String> {
        &self.collection_attribute_names
    }

    pub fn is_collection_attribute(&self, attribute: &str) -> bool {
        self.collection_attribute_names.contains(attribute)
    }

    /// Whether instances track their own dirty attributes.
    pub fn in_line_dirty_checking(&self) -> bool {
        self.in_line_dirty_checking
    }

    /// Whether any non-identifier write must first load the full state.
    pub fn requires_full_init_before_write(&self) -> bool {
        self.requires_full_init_before_write
    }
}
