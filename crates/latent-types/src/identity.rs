use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::value::Value;

/// Identifier value of a managed entity.
///
/// Composite identifiers are keyed by the names of the identifier attributes
/// that make them up, so a single part can be served without materializing
/// the entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    Simple(Value),
    Composite(BTreeMap<String, Value>),
}

impl Identifier {
    pub fn simple(value: impl Into<Value>) -> Self {
        Self::Simple(value.into())
    }

    /// Build a composite identifier from `(attribute, value)` pairs.
    pub fn composite<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self::Composite(parts.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// The value of one identifier attribute.
    ///
    /// For a simple identifier every identifier attribute name resolves to
    /// the whole value; for a composite one the named part is returned.
    pub fn part(&self, attribute: &str) -> Result<&Value, TypeError> {
        match self {
            Self::Simple(v) => Ok(v),
            Self::Composite(parts) => parts
                .get(attribute)
                .ok_or_else(|| TypeError::UnknownIdentifierPart(attribute.to_string())),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(Value::Text(s)) => write!(f, "{s}"),
            Self::Simple(v) => write!(f, "{v}"),
            Self::Composite(parts) => {
                write!(f, "(")?;
                for (i, (name, value)) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The `(entity name, identifier)` pair that uniquely identifies a managed
/// instance within a unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    entity_name: String,
    identifier: Identifier,
}

impl EntityKey {
    pub fn new(entity_name: impl Into<String>, identifier: Identifier) -> Self {
        Self {
            entity_name: entity_name.into(),
            identifier,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_name, self.identifier)
    }
}
