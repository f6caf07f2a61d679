//! Lazy-loading walkthroughs against the in-memory store.

use std::sync::Arc;

use latent_intercept::{Enhanced, EntityInterceptor, SurrogateInitializer};
use latent_session::{
    FactoryRegistry, InMemorySessionFactory, LoadCounts, SessionAssociation, SessionFactory,
    SessionOptions, UnitOfWork,
};
use latent_types::{DynamicEntity, EntityKey, Identifier, Value};
use serde::Serialize;
use tracing::debug;

use crate::project::ProjectDocument;

const SHOP_MAPPING: &str = r#"
[[entities]]
name = "Order"
identifier = "id"
enhanced = true
self_dirty_tracking = true
dynamic_update = true

[[entities.attributes]]
name = "status"

[[entities.attributes]]
name = "total"

[[entities.attributes]]
name = "notes"
lazy = true
lazy_group = "text"

[[entities.attributes]]
name = "summary"
lazy = true
lazy_group = "text"

[[entities.attributes]]
name = "rating"
lazy = true
"#;

/// Outcome of one walkthrough.
#[derive(Clone, Debug, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub steps: Vec<String>,
    pub full_loads: usize,
    pub group_loads: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

impl ScenarioReport {
    fn new(name: &'static str, steps: Vec<String>, counts: LoadCounts) -> Self {
        Self {
            name,
            steps,
            full_loads: counts.full_loads,
            group_loads: counts.group_loads,
            sessions_opened: counts.sessions_opened,
            sessions_closed: counts.sessions_closed,
        }
    }
}

fn order_key() -> EntityKey {
    EntityKey::new("Order", Identifier::simple(1))
}

fn shop(allow_load_outside_transaction: bool) -> anyhow::Result<InMemorySessionFactory> {
    let mut document = ProjectDocument::from_toml_str(SHOP_MAPPING)?;
    document.factory.allow_load_outside_transaction = allow_load_outside_transaction;
    let model = Arc::new(document.metamodel()?);
    let factory = InMemorySessionFactory::new(model, document.factory.clone());
    factory.insert_row(
        order_key(),
        [
            ("status", Value::text("NEW")),
            ("total", Value::Int(250)),
            ("notes", Value::text("leave at the door")),
            ("summary", Value::text("two items")),
            ("rating", Value::Int(4)),
        ],
    )?;
    Ok(factory)
}

fn surrogate(
    factory: &InMemorySessionFactory,
    association: Arc<SessionAssociation>,
) -> anyhow::Result<Enhanced<DynamicEntity>> {
    let descriptor = factory.model().descriptor("Order")?;
    let interceptor = SurrogateInitializer::new(Arc::clone(descriptor), order_key(), association);
    Ok(Enhanced::intercepted(
        DynamicEntity::with_dirty_tracking("Order"),
        interceptor,
    ))
}

fn interceptor_name(order: &Enhanced<DynamicEntity>) -> &'static str {
    match order.interceptor() {
        Some(EntityInterceptor::Surrogate(_)) => "surrogate initializer",
        Some(EntityInterceptor::Grouped(_)) => "grouped attribute loader",
        None => "none",
    }
}

/// Write before the first load, then read: the load keeps the written value.
fn write_then_read() -> anyhow::Result<ScenarioReport> {
    let factory = shop(false)?;
    let session = factory.open_session(SessionOptions::default())?;
    let mut order = surrogate(&factory, SessionAssociation::attach(Arc::clone(&session)))?;
    let mut steps = Vec::new();

    steps.push(format!("read id = {} without loading", order.get("id")?));
    order.set("status", "SHIPPED")?;
    steps.push(format!(
        "wrote status = SHIPPED; full loads so far: {}",
        factory.statistics().full_loads
    ));
    steps.push(format!("read total = {} (loads base state)", order.get("total")?));
    steps.push(format!("status after load = {}", order.get("status")?));
    steps.push(format!("interceptor now: {}", interceptor_name(&order)));

    session.close()?;
    Ok(ScenarioReport::new("surrogate", steps, factory.statistics()))
}

/// Lazy attributes arrive one fetch group at a time.
fn fetch_groups() -> anyhow::Result<ScenarioReport> {
    let factory = shop(false)?;
    let session = factory.open_session(SessionOptions::default())?;
    let mut order = surrogate(&factory, SessionAssociation::attach(Arc::clone(&session)))?;
    let mut steps = Vec::new();

    steps.push(format!("read status = {}", order.get("status")?));
    steps.push(format!("read notes = {} (loads group 'text')", order.get("notes")?));
    steps.push(format!(
        "summary loaded with it: {}",
        order.is_attribute_loaded("summary")
    ));
    steps.push(format!("read summary = {}", order.get("summary")?));
    steps.push(format!("read rating = {} (loads default group)", order.get("rating")?));
    steps.push(format!(
        "uninitialized attributes left: {}",
        order.has_any_uninitialized_attributes()
    ));

    session.close()?;
    Ok(ScenarioReport::new("grouped", steps, factory.statistics()))
}

/// A detached entity loads through a temporary session, if allowed.
fn detached(allow_load_outside_transaction: bool) -> anyhow::Result<ScenarioReport> {
    let factory = shop(allow_load_outside_transaction)?;
    let registry = FactoryRegistry::global();
    if allow_load_outside_transaction {
        factory.register(registry)?;
    }

    let session = factory.open_session(SessionOptions::default())?;
    let mut order = surrogate(&factory, SessionAssociation::attach(Arc::clone(&session)))?;
    order.unset_session();
    session.close()?;

    let mut steps = vec![format!(
        "detached; loading outside a transaction allowed: {}",
        order.allow_load_outside_transaction()
    )];
    match order.get("total") {
        Ok(total) => steps.push(format!("read total = {total} through a temporary session")),
        Err(e) => steps.push(format!("read total refused: {e}")),
    }

    if allow_load_outside_transaction {
        registry.deregister(factory.id())?;
    }
    debug!(factory = %factory.id(), "detached scenario finished");
    Ok(ScenarioReport::new("detached", steps, factory.statistics()))
}

pub fn run(allow_load_outside_transaction: bool) -> anyhow::Result<Vec<ScenarioReport>> {
    Ok(vec![
        write_then_read()?,
        fetch_groups()?,
        detached(allow_load_outside_transaction)?,
    ])
}
