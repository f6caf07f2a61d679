//! The CLI's input file and the fetch-group plan derived from it.

use std::fs;
use std::path::Path;

use anyhow::Context;
use latent_meta::{EntityDescriptor, EntityMapping, LazyLoadingConfig, MappingDocument, Metamodel};
use latent_session::SessionFactoryOptions;
use serde::{Deserialize, Serialize};

/// A mapping document plus the factory settings to run it with.
///
/// ```toml
/// [lazy]
/// collections_in_default_fetch_group = false
///
/// [factory]
/// allow_load_outside_transaction = true
///
/// [[entities]]
/// name = "Order"
/// identifier = "id"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(default)]
    pub lazy: LazyLoadingConfig,
    #[serde(default)]
    pub factory: SessionFactoryOptions,
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
}

impl ProjectDocument {
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        toml::from_str(source).context("invalid mapping document")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("in {}", path.display()))
    }

    pub fn mapping(&self) -> MappingDocument {
        MappingDocument {
            lazy: self.lazy.clone(),
            entities: self.entities.clone(),
        }
    }

    pub fn metamodel(&self) -> anyhow::Result<Metamodel> {
        Ok(Metamodel::from_document(&self.mapping())?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchGroupPlan {
    pub name: String,
    pub attributes: Vec<String>,
}

/// What the runtime will do for one entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntityPlan {
    pub name: String,
    pub enhanced: bool,
    pub identifier: Vec<String>,
    pub collections: Vec<String>,
    pub in_line_dirty_checking: bool,
    pub full_init_before_write: bool,
    pub fetch_groups: Vec<FetchGroupPlan>,
}

impl EntityPlan {
    pub fn of(descriptor: &EntityDescriptor) -> Self {
        let related = descriptor.related_state();
        let groups = descriptor.fetch_groups();
        let identifier = match related.composite_identifier() {
            Some(parts) => parts.to_vec(),
            None => related.identifier_attribute_names().iter().cloned().collect(),
        };
        Self {
            name: descriptor.name().to_string(),
            enhanced: groups.is_enhanced(),
            identifier,
            collections: related.collection_attribute_names().iter().cloned().collect(),
            in_line_dirty_checking: related.in_line_dirty_checking(),
            full_init_before_write: related.requires_full_init_before_write(),
            fetch_groups: groups
                .fetch_group_names()
                .map(|name| FetchGroupPlan {
                    name: name.to_string(),
                    attributes: groups.group(name).iter().map(|d| d.name().to_string()).collect(),
                })
                .collect(),
        }
    }

    pub fn lazy_attribute_count(&self) -> usize {
        self.fetch_groups.iter().map(|g| g.attributes.len()).sum()
    }
}

/// Plans for every entity type, or just `only` when given.
pub fn plan(model: &Metamodel, only: Option<&str>) -> anyhow::Result<Vec<EntityPlan>> {
    match only {
        Some(name) => Ok(vec![EntityPlan::of(model.descriptor(name)?)]),
        None => Ok(model.iter().map(|d| EntityPlan::of(d)).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latent_session::TransactionModel;

    const SHOP: &str = r#"
        [lazy]
        collections_in_default_fetch_group = false

        [factory]
        allow_load_outside_transaction = true
        transaction_model = "externally_managed"

        [[entities]]
        name = "Order"
        identifier = "id"
        enhanced = true
        self_dirty_tracking = true
        dynamic_update = true

        [[entities.attributes]]
        name = "status"

        [[entities.attributes]]
        name = "notes"
        lazy = true
        lazy_group = "text"

        [[entities.attributes]]
        name = "summary"
        lazy = true
        lazy_group = "text"

        [[entities.attributes]]
        name = "lines"
        kind = "collection"

        [[entities]]
        name = "OrderLine"
        identifier = ["order_id", "position"]

        [[entities.attributes]]
        name = "qty"
    "#;

    #[test]
    fn parses_factory_settings() {
        let doc = ProjectDocument::from_toml_str(SHOP).unwrap();
        assert!(doc.factory.allow_load_outside_transaction);
        assert_eq!(doc.factory.transaction_model, TransactionModel::ExternallyManaged);
        assert_eq!(doc.entities.len(), 2);
    }

    #[test]
    fn factory_table_is_optional() {
        let doc = ProjectDocument::from_toml_str("").unwrap();
        assert_eq!(doc, ProjectDocument::default());
        assert!(!doc.factory.allow_load_outside_transaction);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(ProjectDocument::from_toml_str("[[entities]]\nidentifier = 3").is_err());
    }

    #[test]
    fn plan_lists_fetch_groups() {
        let model = ProjectDocument::from_toml_str(SHOP).unwrap().metamodel().unwrap();
        let plans = plan(&model, Some("Order")).unwrap();
        assert_eq!(plans.len(), 1);

        let order = &plans[0];
        assert!(order.enhanced);
        assert_eq!(order.identifier, ["id"]);
        assert_eq!(order.collections, ["lines"]);
        assert!(order.in_line_dirty_checking);
        assert!(!order.full_init_before_write);

        let text = order.fetch_groups.iter().find(|g| g.name == "text").unwrap();
        assert_eq!(text.attributes, ["notes", "summary"]);
        assert!(!order
            .fetch_groups
            .iter()
            .any(|g| g.attributes.iter().any(|a| a == "status")));
    }

    #[test]
    fn plan_keeps_composite_identifier_order() {
        let model = ProjectDocument::from_toml_str(SHOP).unwrap().metamodel().unwrap();
        let plans = plan(&model, None).unwrap();
        assert_eq!(plans.len(), 2);
        let line = plans.iter().find(|p| p.name == "OrderLine").unwrap();
        assert_eq!(line.identifier, ["order_id", "position"]);
        assert_eq!(line.lazy_attribute_count(), 0);
    }

    #[test]
    fn plan_of_unknown_entity_fails() {
        let model = ProjectDocument::from_toml_str(SHOP).unwrap().metamodel().unwrap();
        assert!(plan(&model, Some("Customer")).is_err());
    }
}
