//! Boot-time mapping model.
//!
//! This is the input the metamodel is built from: which attributes an entity
//! type has, how they are associated, and which are declared lazy. It is
//! deliberately small; column and type mapping belong to the storage layer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::LazyLoadingConfig;
use crate::error::{MetaError, MetaResult};

/// Identifier attribute(s) of an entity type.
///
/// In TOML a single name maps to [`IdentifierMapping::Simple`] and an array
/// of names to [`IdentifierMapping::Composite`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentifierMapping {
    Simple(String),
    Composite(Vec<String>),
}

impl IdentifierMapping {
    pub fn attribute_names(&self) -> Vec<String> {
        match self {
            Self::Simple(name) => vec![name.clone()],
            Self::Composite(names) => names.clone(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

/// Shape of a persistent attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Scalar value stored in the owner's row.
    #[default]
    Basic,
    /// Many-to-one or one-to-one association.
    ToOne,
    /// One-to-many, many-to-many, or element collection.
    Collection,
}

/// A non-identifier persistent attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub name: String,
    #[serde(default)]
    pub kind: AttributeKind,
    /// Declared lazy in the mapping.
    #[serde(default)]
    pub lazy: bool,
    /// Explicit fetch group.
    #[serde(default)]
    pub lazy_group: Option<String>,
    /// To-one association sharing the owner's primary key, with no column of
    /// its own to build a surrogate from.
    #[serde(default)]
    pub shares_primary_key: bool,
}

impl AttributeMapping {
    pub fn basic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Basic,
            lazy: false,
            lazy_group: None,
            shares_primary_key: false,
        }
    }

    pub fn to_one(name: impl Into<String>) -> Self {
        Self {
            kind: AttributeKind::ToOne,
            ..Self::basic(name)
        }
    }

    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            kind: AttributeKind::Collection,
            ..Self::basic(name)
        }
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.lazy = true;
        self.lazy_group = Some(group.into());
        self
    }

    pub fn sharing_primary_key(mut self) -> Self {
        self.shares_primary_key = true;
        self
    }

    pub fn is_collection(&self) -> bool {
        self.kind == AttributeKind::Collection
    }

    pub fn is_association(&self) -> bool {
        matches!(self.kind, AttributeKind::ToOne | AttributeKind::Collection)
    }
}

/// Boot-time mapping of one entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub name: String,
    pub identifier: IdentifierMapping,
    /// Enhanced for lazy attribute interception.
    #[serde(default)]
    pub enhanced: bool,
    /// Instances track their own dirty attributes.
    #[serde(default)]
    pub self_dirty_tracking: bool,
    /// Updates are generated per changed attribute set.
    #[serde(default)]
    pub dynamic_update: bool,
    /// Optimistically versioned.
    #[serde(default)]
    pub versioned: bool,
    /// Non-identifier attributes in declaration order.
    #[serde(default)]
    pub attributes: Vec<AttributeMapping>,
}

impl EntityMapping {
    /// An enhanced, self-tracking, dynamically updated entity with a simple
    /// identifier: the configuration with the cheapest write path.
    pub fn new(name: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier: IdentifierMapping::Simple(identifier.into()),
            enhanced: true,
            self_dirty_tracking: true,
            dynamic_update: true,
            versioned: false,
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, attribute: AttributeMapping) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn composite_identifier<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier = IdentifierMapping::Composite(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn attribute_named(&self, name: &str) -> Option<&AttributeMapping> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Structural checks: identifier present, names unique, identifier
    /// attributes not repeated among the regular attributes.
    pub fn validate(&self) -> MetaResult<()> {
        if self.name.trim().is_empty() {
            return Err(MetaError::invalid(&self.name, "entity name is empty"));
        }

        let id_names = self.identifier.attribute_names();
        if id_names.is_empty() || id_names.iter().any(|n| n.trim().is_empty()) {
            return Err(MetaError::invalid(&self.name, "identifier attribute name is empty"));
        }

        let mut seen = HashSet::new();
        for name in &id_names {
            if !seen.insert(name.as_str()) {
                return Err(MetaError::invalid(
                    &self.name,
                    format!("identifier attribute '{name}' listed twice"),
                ));
            }
        }

        for attribute in &self.attributes {
            if attribute.name.trim().is_empty() {
                return Err(MetaError::invalid(&self.name, "attribute name is empty"));
            }
            if !seen.insert(attribute.name.as_str()) {
                return Err(MetaError::invalid(
                    &self.name,
                    format!("attribute '{}' is declared more than once", attribute.name),
                ));
            }
        }

        Ok(())
    }
}

/// A complete mapping document: lazy-loading settings plus entity mappings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub lazy: LazyLoadingConfig,
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
}

impl MappingDocument {
    /// Parse a TOML mapping document.
    pub fn from_toml_str(source: &str) -> MetaResult<Self> {
        toml::from_str(source).map_err(|e| MetaError::Config(e.to_string()))
    }
}
