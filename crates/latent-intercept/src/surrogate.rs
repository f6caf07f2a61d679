//! Identity-only surrogates.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use latent_meta::{CallbackKind, EntityDescriptor};
use latent_session::{perform_work, EntityPersister, SessionAssociation, UnitOfWork};
use latent_types::{EntityKey, ManagedEntity, Value};
use tracing::{debug, error};

use crate::error::{InterceptError, InterceptResult};
use crate::grouped::GroupedAttributeLoader;
use crate::interceptor::AttributeInterceptor;

/// Lifecycle of a [`SurrogateInitializer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LazyStatus {
    Uninitialized,
    /// The base state is being loaded. Callbacks made by the load itself
    /// pass straight through.
    Initializing,
    /// Terminal. The object's own storage is authoritative.
    Initialized,
}

impl fmt::Display for LazyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
        };
        f.write_str(name)
    }
}

/// Interceptor of an identity-only surrogate.
pub struct SurrogateInitializer {
    entity: Arc<EntityDescriptor>,
    key: EntityKey,
    association: Arc<SessionAssociation>,
    status: LazyStatus,
    /// Attributes written before initialization, in first-write order.
    written: Vec<String>,
    /// Lazy attributes made valid during initialization: the fetch group
    /// of a lazy first read, or a lazy attribute written through.
    initialized_lazy: BTreeSet<String>,
}

impl SurrogateInitializer {
    pub fn new(
        entity: Arc<EntityDescriptor>,
        key: EntityKey,
        association: Arc<SessionAssociation>,
    ) -> Self {
        Self {
            entity,
            key,
            association,
            status: LazyStatus::Uninitialized,
            written: Vec::new(),
            initialized_lazy: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn status(&self) -> LazyStatus {
        self.status
    }

    pub fn is_initialized(&self) -> bool {
        self.status == LazyStatus::Initialized
    }

    /// Attributes written before initialization, in first-write order.
    pub fn written_attributes(&self) -> &[String] {
        &self.written
    }

    /// Load the base state now, as a non-identifier read would.
    pub fn force_initialize(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
    ) -> InterceptResult<()> {
        self.check_not_initialized(attribute, "initialization")?;
        if self.status == LazyStatus::Initializing {
            return Ok(());
        }
        self.initialize(target, attribute, true)
    }

    /// The interceptor that should take over once this surrogate is
    /// initialized: a grouped loader if the type still has lazy attributes
    /// that were not written in the meantime, otherwise none.
    pub fn into_grouped_loader(self) -> Option<GroupedAttributeLoader> {
        let fetch_groups = self.entity.fetch_groups();
        if !fetch_groups.has_lazy_attributes() {
            return None;
        }
        let lazy = fetch_groups.lazy_attribute_names();
        let initialized: Vec<String> = self
            .written
            .into_iter()
            .filter(|name| lazy.contains(name))
            .chain(self.initialized_lazy)
            .collect();
        let loader =
            GroupedAttributeLoader::new(self.entity, self.key, initialized, self.association);
        loader.has_any_uninitialized_attributes().then_some(loader)
    }

    fn check_not_initialized(&self, attribute: &str, operation: &'static str) -> InterceptResult<()> {
        if self.status != LazyStatus::Initialized {
            return Ok(());
        }
        error!(
            key = %self.key,
            attribute,
            operation,
            "callback received by an initialized surrogate"
        );
        Err(InterceptError::AlreadyInitialized {
            entity: self.entity.name().to_string(),
            attribute: attribute.to_string(),
            operation,
        })
    }

    /// Load the base state. With `fetch_group`, a lazy `attribute` also
    /// gets its fetch group loaded in the same unit of work.
    fn initialize(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        fetch_group: bool,
    ) -> InterceptResult<()> {
        // The load overwrites the raw storage, so capture what was written
        // first.
        let pending: Vec<(String, Value)> = self
            .written
            .iter()
            .map(|name| (name.clone(), target.get(name).cloned().unwrap_or_default()))
            .collect();
        let group: Vec<String> = if fetch_group {
            self.entity
                .fetch_groups()
                .group_of(attribute)
                .iter()
                .map(|d| d.name().to_string())
                .collect()
        } else {
            Vec::new()
        };

        self.status = LazyStatus::Initializing;
        let entity_name = self.entity.name();
        let key = &self.key;
        let loaded = perform_work(
            &self.association,
            entity_name,
            attribute,
            |session: &dyn UnitOfWork, temporary| -> InterceptResult<Option<Value>> {
                if temporary {
                    session.register_read_only(key)?;
                }
                let persister = session.persister(entity_name)?;
                persister.initialize_enhanced_entity_used_as_proxy(
                    &mut *target,
                    key,
                    attribute,
                    session,
                )?;
                if group.is_empty() {
                    return Ok(None);
                }
                let value =
                    persister.initialize_lazy_property(attribute, &mut *target, key, session)?;
                Ok(Some(value))
            },
        );
        let group_value = match loaded {
            Ok(value) => value,
            Err(e) => {
                self.status = LazyStatus::Uninitialized;
                return Err(e);
            }
        };
        self.status = LazyStatus::Initialized;
        self.initialized_lazy.extend(group.iter().cloned());

        for (name, value) in pending {
            target.set(&name, value);
            if let Some(tracker) = target.dirty_tracker_mut() {
                tracker.track_change(&name);
            }
        }
        if let Some(collection) = group_value.as_ref().and_then(Value::as_collection) {
            if let (Some(len), Some(tracker)) = (collection.len(), target.dirty_tracker_mut()) {
                tracker.snapshot_collection_size(attribute, len);
            }
        }
        let callbacks = self.entity.callbacks().fire(CallbackKind::PostLoad, target);

        debug!(
            key = %self.key,
            attribute,
            replayed = self.written.len(),
            ?group,
            callbacks,
            "initialized surrogate"
        );
        Ok(())
    }
}

impl AttributeInterceptor for SurrogateInitializer {
    fn entity_name(&self) -> &str {
        self.entity.name()
    }

    fn handle_read(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        value: Value,
    ) -> InterceptResult<Value> {
        self.check_not_initialized(attribute, "read")?;
        if self.status == LazyStatus::Initializing {
            return Ok(value);
        }

        if self.entity.related_state().is_identifier_attribute(attribute) {
            return Ok(self.key.identifier().part(attribute)?.clone());
        }
        if self.written.iter().any(|name| name == attribute) {
            return Ok(value);
        }

        self.initialize(target, attribute, true)?;
        Ok(target.get(attribute).cloned().unwrap_or_default())
    }

    fn handle_write(
        &mut self,
        target: &mut dyn ManagedEntity,
        attribute: &str,
        old: Value,
        new: Value,
    ) -> InterceptResult<Value> {
        self.check_not_initialized(attribute, "write")?;
        if self.status == LazyStatus::Initializing {
            return Ok(new);
        }

        let related_state = self.entity.related_state();
        if related_state.is_identifier_attribute(attribute) {
            let known = self.key.identifier().part(attribute)?;
            if *known != new {
                return Err(InterceptError::IdentifierAltered {
                    entity: self.entity.name().to_string(),
                    attribute: attribute.to_string(),
                    from: known.clone(),
                    to: new,
                });
            }
            return Ok(new);
        }

        if related_state.requires_full_init_before_write() {
            self.initialize(target, attribute, false)?;
            // The written value is authoritative; the successor must not
            // load over it.
            if self.entity.fetch_groups().is_lazy_attribute(attribute) {
                self.initialized_lazy.insert(attribute.to_string());
            }
            return Ok(new);
        }

        debug!(key = %self.key, attribute, previous = %old, "deferred write on surrogate");
        if !self.written.iter().any(|name| name == attribute) {
            self.written.push(attribute.to_string());
        }
        if let Some(tracker) = target.dirty_tracker_mut() {
            tracker.track_change(attribute);
        }
        Ok(new)
    }

    fn attribute_initialized(&mut self, attribute: &str) -> InterceptResult<()> {
        self.check_not_initialized(attribute, "initialization notice")?;
        if !self.written.iter().any(|name| name == attribute) {
            self.written.push(attribute.to_string());
        }
        Ok(())
    }

    fn is_attribute_loaded(&self, attribute: &str) -> bool {
        self.is_initialized()
            || self.entity.related_state().is_identifier_attribute(attribute)
            || self.written.iter().any(|name| name == attribute)
    }

    fn has_any_uninitialized_attributes(&self) -> bool {
        !self.is_initialized()
    }

    fn initialized_lazy_attribute_names(&self) -> BTreeSet<String> {
        let lazy = self.entity.fetch_groups().lazy_attribute_names();
        self.written
            .iter()
            .filter(|name| lazy.contains(name.as_str()))
            .chain(&self.initialized_lazy)
            .cloned()
            .collect()
    }

    fn association(&self) -> &Arc<SessionAssociation> {
        &self.association
    }

    fn set_association(&mut self, association: Arc<SessionAssociation>) {
        self.association = association;
    }
}

impl fmt::Debug for SurrogateInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurrogateInitializer")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("written", &self.written)
            .field("initialized_lazy", &self.initialized_lazy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, invoice_key, order_key};
    use latent_session::{LoadEvent, SessionOptions, SessionFactory};
    use latent_types::{DynamicEntity, Identifier};

    fn surrogate(
        fixture: &fixtures::Fixture,
        key: EntityKey,
    ) -> (SurrogateInitializer, DynamicEntity) {
        let session = fixture.factory.open_session(SessionOptions::default()).unwrap();
        let entity = fixture.model.descriptor(key.entity_name()).unwrap();
        let interceptor = SurrogateInitializer::new(
            Arc::clone(entity),
            key.clone(),
            SessionAssociation::attach(session),
        );
        (interceptor, DynamicEntity::with_dirty_tracking(key.entity_name()))
    }

    #[test]
    fn identifier_read_is_served_from_the_key() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());

        let id = s.handle_read(&mut target, "id", Value::Null).unwrap();

        assert_eq!(id, Value::Int(42));
        assert_eq!(s.status(), LazyStatus::Uninitialized);
        assert_eq!(fixture.factory.statistics().full_loads, 0);
    }

    #[test]
    fn composite_identifier_parts_are_served_from_the_key() {
        let fixture = fixtures::fixture(false);
        let key = fixtures::line_item_key();
        let (mut s, mut target) = surrogate(&fixture, key);

        let line = s.handle_read(&mut target, "line_no", Value::Null).unwrap();

        assert_eq!(line, Value::Int(1));
        assert!(s.is_attribute_loaded("order_id"));
        assert_eq!(fixture.factory.statistics().full_loads, 0);
    }

    #[test]
    fn first_read_loads_base_state_once() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());

        let status = s.handle_read(&mut target, "status", Value::Null).unwrap();

        assert_eq!(status, Value::text("NEW"));
        assert!(s.is_initialized());
        assert_eq!(target.get("total"), Some(&Value::Int(100)));
        assert!(target.get("notes").is_none());
        assert_eq!(
            fixture.factory.load_events(),
            [LoadEvent::FullState {
                key: order_key(),
                triggered_by: "status".into()
            }]
        );
    }

    #[test]
    fn callbacks_after_initialization_are_rejected() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());
        s.handle_read(&mut target, "status", Value::Null).unwrap();

        let err = s.handle_read(&mut target, "total", Value::Null).unwrap_err();
        assert!(matches!(err, InterceptError::AlreadyInitialized { operation: "read", .. }));
        let err = s
            .handle_write(&mut target, "total", Value::Null, Value::Int(1))
            .unwrap_err();
        assert!(matches!(err, InterceptError::AlreadyInitialized { operation: "write", .. }));
        assert_eq!(fixture.factory.statistics().full_loads, 1);
    }

    #[test]
    fn writes_before_initialization_are_replayed_in_order() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());

        for (name, value) in [("status", Value::text("PAID")), ("total", Value::Int(250))] {
            let stored = s
                .handle_write(&mut target, name, Value::Null, value.clone())
                .unwrap();
            target.set(name, stored);
        }
        assert_eq!(s.written_attributes(), ["status", "total"]);
        assert_eq!(fixture.factory.statistics().full_loads, 0);

        let placed = s.handle_read(&mut target, "placed_on", Value::Null).unwrap();

        assert_eq!(placed, Value::text("2024-05-01"));
        assert_eq!(target.get("status"), Some(&Value::text("PAID")));
        assert_eq!(target.get("total"), Some(&Value::Int(250)));
        assert_eq!(fixture.factory.statistics().full_loads, 1);
        let tracker = target.dirty_tracker().unwrap();
        assert_eq!(tracker.dirty_attributes(), ["status", "total"]);
    }

    #[test]
    fn reading_a_written_attribute_does_not_load() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());
        s.handle_write(&mut target, "status", Value::Null, Value::text("PAID"))
            .unwrap();
        target.set("status", Value::text("PAID"));

        let status = s
            .handle_read(&mut target, "status", Value::text("PAID"))
            .unwrap();

        assert_eq!(status, Value::text("PAID"));
        assert_eq!(s.status(), LazyStatus::Uninitialized);
        assert_eq!(fixture.factory.statistics().full_loads, 0);
    }

    #[test]
    fn identifier_write_must_keep_the_known_value() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());

        let same = s
            .handle_write(&mut target, "id", Value::Null, Value::Int(42))
            .unwrap();
        assert_eq!(same, Value::Int(42));
        assert_eq!(s.status(), LazyStatus::Uninitialized);

        let err = s
            .handle_write(&mut target, "id", Value::Int(42), Value::Int(43))
            .unwrap_err();
        assert_eq!(
            err,
            InterceptError::IdentifierAltered {
                entity: "Order".into(),
                attribute: "id".into(),
                from: Value::Int(42),
                to: Value::Int(43),
            }
        );
        assert_eq!(s.key().identifier(), &Identifier::simple(42));
        assert_eq!(s.status(), LazyStatus::Uninitialized);
    }

    #[test]
    fn versioned_entity_loads_before_write() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, invoice_key());

        let stored = s
            .handle_write(&mut target, "amount", Value::Null, Value::Int(11))
            .unwrap();

        assert_eq!(stored, Value::Int(11));
        assert!(s.is_initialized());
        assert_eq!(target.get("version"), Some(&Value::Int(3)));
        assert!(s.written_attributes().is_empty());
    }

    #[test]
    fn lazy_first_read_loads_its_fetch_group_with_the_base_state() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());

        let notes = s.handle_read(&mut target, "notes", Value::Null).unwrap();

        assert_eq!(notes, Value::text("fragile"));
        assert_eq!(target.get("total"), Some(&Value::Int(100)));
        assert_eq!(target.get("rating"), Some(&Value::Int(5)));
        let counts = fixture.factory.statistics();
        assert_eq!((counts.full_loads, counts.group_loads), (1, 1));
        assert_eq!(counts.sessions_opened, 1);

        let names: Vec<_> = s.initialized_lazy_attribute_names().into_iter().collect();
        assert_eq!(names, ["notes", "rating"]);
        let loader = s.into_grouped_loader().unwrap();
        assert!(loader.is_attribute_loaded("rating"));
        assert!(!loader.is_attribute_loaded("lines"));
    }

    #[test]
    fn lazy_first_read_of_a_collection_snapshots_its_size() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());

        let lines = s.handle_read(&mut target, "lines", Value::Null).unwrap();

        assert_eq!(lines.as_collection().and_then(|c| c.len()), Some(3));
        assert_eq!(target.dirty_tracker().unwrap().collection_size("lines"), Some(3));
        assert_eq!(fixture.factory.statistics().group_loads, 1);
    }

    #[test]
    fn lazy_write_on_versioned_entity_is_not_reloaded() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, invoice_key());

        let stored = s
            .handle_write(&mut target, "memo", Value::Null, Value::text("net 60"))
            .unwrap();
        target.set("memo", stored);

        assert!(s.is_initialized());
        assert_eq!(target.get("amount"), Some(&Value::Int(10)));
        let counts = fixture.factory.statistics();
        assert_eq!((counts.full_loads, counts.group_loads), (1, 0));

        let mut loader = s.into_grouped_loader().unwrap();
        assert!(loader.is_attribute_loaded("memo"));
        assert!(!loader.is_attribute_loaded("pdf"));
        let memo = loader
            .handle_read(&mut target, "memo", Value::text("net 60"))
            .unwrap();
        assert_eq!(memo, Value::text("net 60"));
        assert_eq!(fixture.factory.statistics().group_loads, 0);
    }

    #[test]
    fn post_load_callbacks_fire_after_replay() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());
        s.handle_write(&mut target, "status", Value::Null, Value::text("PAID"))
            .unwrap();
        target.set("status", Value::text("PAID"));

        s.handle_read(&mut target, "total", Value::Null).unwrap();

        // The callback copies status, so it saw the replayed value.
        assert_eq!(target.get("status_at_load"), Some(&Value::text("PAID")));
    }

    #[test]
    fn failed_load_leaves_the_surrogate_uninitialized() {
        let fixture = fixtures::fixture(false);
        let session = fixture.factory.open_session(SessionOptions::default()).unwrap();
        let entity = fixture.model.descriptor("Order").unwrap();
        let mut s = SurrogateInitializer::new(
            Arc::clone(entity),
            EntityKey::new("Order", Identifier::simple(404)),
            SessionAssociation::attach(Arc::clone(&session)),
        );
        let mut target = DynamicEntity::new("Order");

        let err = s.handle_read(&mut target, "status", Value::Null).unwrap_err();
        assert!(matches!(
            err,
            InterceptError::Session(latent_session::SessionError::RowNotFound(_))
        ));
        assert_eq!(s.status(), LazyStatus::Uninitialized);
    }

    #[test]
    fn no_session_is_reported_with_entity_and_attribute() {
        let fixture = fixtures::fixture(false);
        let entity = fixture.model.descriptor("Order").unwrap();
        let mut s = SurrogateInitializer::new(
            Arc::clone(entity),
            order_key(),
            SessionAssociation::unassociated(),
        );

        let err = s
            .handle_read(&mut DynamicEntity::new("Order"), "total", Value::Null)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to perform requested lazy initialization [Order.total] - no session and \
             settings disallow loading outside the session"
        );
    }

    #[test]
    fn detached_surrogate_loads_through_a_temporary_session() {
        let fixture = fixtures::fixture(true);
        let (mut s, mut target) = surrogate(&fixture, order_key());
        s.unset_session();
        assert!(s.linked_session().is_none());
        assert!(s.allow_load_outside_transaction());

        let total = s.handle_read(&mut target, "total", Value::Null).unwrap();

        assert_eq!(total, Value::Int(100));
        let counts = fixture.factory.statistics();
        // One session from the fixture helper plus the temporary one.
        assert_eq!(counts.sessions_opened, 2);
        assert_eq!(counts.open_sessions(), 1);
        assert_eq!(counts.commits, 1);
    }

    #[test]
    fn grouped_loader_takes_over_remaining_lazy_attributes() {
        let fixture = fixtures::fixture(false);
        let (mut s, mut target) = surrogate(&fixture, order_key());
        s.handle_write(&mut target, "notes", Value::Null, Value::text("mine"))
            .unwrap();
        s.handle_read(&mut target, "status", Value::Null).unwrap();

        let loader = s.into_grouped_loader().unwrap();

        assert!(loader.is_attribute_loaded("notes"));
        assert!(!loader.is_attribute_loaded("lines"));
    }
}
