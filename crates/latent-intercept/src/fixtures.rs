//! Shared metamodel and rows for the interception tests.

use std::sync::Arc;

use latent_meta::{AttributeMapping, CallbackKind, EntityMapping, LazyLoadingConfig, Metamodel};
use latent_session::{FactoryRegistry, InMemorySessionFactory, SessionFactoryOptions};
use latent_types::{CollectionValue, EntityKey, Identifier, ManagedEntity, Value};

pub(crate) struct Fixture {
    pub model: Arc<Metamodel>,
    pub factory: InMemorySessionFactory,
}

pub(crate) fn order_key() -> EntityKey {
    EntityKey::new("Order", Identifier::simple(42))
}

pub(crate) fn item_key() -> EntityKey {
    EntityKey::new("Item", Identifier::simple(1))
}

pub(crate) fn invoice_key() -> EntityKey {
    EntityKey::new("Invoice", Identifier::simple(7))
}

pub(crate) fn line_item_key() -> EntityKey {
    EntityKey::new(
        "LineItem",
        Identifier::composite([("order_id", Value::Int(42)), ("line_no", Value::Int(1))]),
    )
}

pub(crate) fn model() -> Metamodel {
    let mut invoice = EntityMapping::new("Invoice", "id")
        .attribute(AttributeMapping::basic("amount"))
        .attribute(AttributeMapping::basic("version"))
        .attribute(AttributeMapping::basic("memo").lazy())
        .attribute(AttributeMapping::basic("pdf").in_group("files"));
    invoice.versioned = true;

    Metamodel::builder(LazyLoadingConfig::default())
        .entity(
            EntityMapping::new("Order", "id")
                .attribute(AttributeMapping::basic("status"))
                .attribute(AttributeMapping::basic("total"))
                .attribute(AttributeMapping::basic("placed_on"))
                .attribute(AttributeMapping::basic("score"))
                .attribute(AttributeMapping::basic("notes").lazy())
                .attribute(AttributeMapping::basic("rating").lazy())
                .attribute(AttributeMapping::collection("lines"))
                .attribute(AttributeMapping::collection("tags"))
                .attribute(AttributeMapping::to_one("customer").lazy()),
        )
        .entity(
            EntityMapping::new("Item", "id")
                .attribute(AttributeMapping::basic("name"))
                .attribute(AttributeMapping::basic("a").in_group("G1"))
                .attribute(AttributeMapping::basic("b").in_group("G2"))
                .attribute(AttributeMapping::basic("c").in_group("G2")),
        )
        .entity(invoice)
        .entity(
            EntityMapping::new("LineItem", "order_id")
                .composite_identifier(["order_id", "line_no"])
                .attribute(AttributeMapping::basic("qty")),
        )
        .callback("Order", CallbackKind::PostLoad, |order| {
            let status = order.get("status").cloned().unwrap_or_default();
            order.set("status_at_load", status);
        })
        .build()
        .expect("fixture model is valid")
}

/// A factory holding one row per fixture entity. With
/// `allow_load_outside_transaction` it is also registered globally so
/// detached interceptors can reach it.
pub(crate) fn fixture(allow_load_outside_transaction: bool) -> Fixture {
    let model = Arc::new(model());
    let factory = InMemorySessionFactory::new(
        Arc::clone(&model),
        SessionFactoryOptions {
            allow_load_outside_transaction,
            ..Default::default()
        },
    );

    let customer = EntityKey::new("Customer", Identifier::simple(9));
    let rows = [
        (
            order_key(),
            vec![
                ("status", Value::text("NEW")),
                ("total", Value::Int(100)),
                ("placed_on", Value::text("2024-05-01")),
                ("score", Value::Float(1.0)),
                ("notes", Value::text("fragile")),
                ("rating", Value::Int(5)),
                (
                    "lines",
                    Value::Collection(CollectionValue::loaded(vec![
                        Value::Int(1),
                        Value::Int(2),
                        Value::Int(3),
                    ])),
                ),
                ("tags", Value::Collection(CollectionValue::uninitialized())),
                ("customer", Value::reference(customer)),
            ],
        ),
        (
            EntityKey::new("Order", Identifier::simple(43)),
            vec![("status", Value::text("NEW")), ("total", Value::Int(7))],
        ),
        (
            item_key(),
            vec![
                ("name", Value::text("item")),
                ("a", Value::text("A")),
                ("b", Value::text("B")),
                ("c", Value::text("C")),
            ],
        ),
        (
            invoice_key(),
            vec![
                ("amount", Value::Int(10)),
                ("version", Value::Int(3)),
                ("memo", Value::text("net 30")),
                ("pdf", Value::text("scan-7.pdf")),
            ],
        ),
        (line_item_key(), vec![("qty", Value::Int(5))]),
    ];
    for (key, row) in rows {
        factory.insert_row(key, row).expect("row inserted");
    }

    if allow_load_outside_transaction {
        factory
            .register(FactoryRegistry::global())
            .expect("factory registered");
    }
    Fixture { model, factory }
}
