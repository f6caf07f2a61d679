use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use latent_meta::{EntityDescriptor, Metamodel};
use latent_types::{EntityKey, ManagedEntity, Value};
use tracing::debug;

use crate::config::{SessionFactoryOptions, SessionOptions};
use crate::error::{SessionError, SessionResult};
use crate::registry::{FactoryId, FactoryRegistry, SessionId};
use crate::traits::{EntityPersister, SessionFactory, UnitOfWork};

/// One load served by an [`InMemoryPersister`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadEvent {
    /// Base state of a surrogate was loaded.
    FullState { key: EntityKey, triggered_by: String },
    /// One lazy fetch group was loaded.
    FetchGroup {
        key: EntityKey,
        group: String,
        attributes: Vec<String>,
    },
}

/// Counters kept by an [`InMemorySessionFactory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadCounts {
    pub full_loads: usize,
    pub group_loads: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub transactions_begun: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

impl LoadCounts {
    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.sessions_opened - self.sessions_closed
    }
}

/// Lifecycle steps that should fail on every session of a factory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultInjection {
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_close: bool,
    pub fail_load: bool,
}

#[derive(Default)]
struct Counters {
    full_loads: AtomicUsize,
    group_loads: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    transactions_begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LoadCounts {
        LoadCounts {
            full_loads: self.full_loads.load(Ordering::Relaxed),
            group_loads: self.group_loads.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            transactions_begun: self.transactions_begun.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}

struct FactoryShared {
    id: FactoryId,
    options: SessionFactoryOptions,
    model: Arc<Metamodel>,
    rows: RwLock<HashMap<EntityKey, BTreeMap<String, Value>>>,
    events: Mutex<Vec<LoadEvent>>,
    faults: RwLock<FaultInjection>,
    counters: Counters,
    closed: AtomicBool,
}

impl FactoryShared {
    fn faults(&self) -> FaultInjection {
        self.faults.read().map(|f| *f).unwrap_or_default()
    }

    fn row(&self, key: &EntityKey) -> SessionResult<BTreeMap<String, Value>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))?;
        rows.get(key)
            .cloned()
            .ok_or_else(|| SessionError::RowNotFound(key.clone()))
    }

    fn record(&self, event: LoadEvent) -> SessionResult<()> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))?;
        events.push(event);
        Ok(())
    }
}

/// Factory of [`InMemorySession`]s over a shared row store.
///
/// Cloning is cheap; clones share rows, counters, and identity.
#[derive(Clone)]
pub struct InMemorySessionFactory {
    shared: Arc<FactoryShared>,
}

impl InMemorySessionFactory {
    pub fn new(model: Arc<Metamodel>, options: SessionFactoryOptions) -> Self {
        Self {
            shared: Arc::new(FactoryShared {
                id: FactoryId::new(),
                options,
                model,
                rows: RwLock::new(HashMap::new()),
                events: Mutex::new(Vec::new()),
                faults: RwLock::new(FaultInjection::default()),
                counters: Counters::default(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> FactoryId {
        self.shared.id
    }

    pub fn model(&self) -> &Arc<Metamodel> {
        &self.shared.model
    }

    /// Store (or replace) the persistent state of one entity.
    pub fn insert_row<I, S>(&self, key: EntityKey, attributes: I) -> SessionResult<()>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let row = attributes.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let mut rows = self
            .shared
            .rows
            .write()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))?;
        rows.insert(key, row);
        Ok(())
    }

    /// Open a session and keep its concrete type.
    pub fn open(&self, options: SessionOptions) -> SessionResult<Arc<InMemorySession>> {
        if self.is_closed() {
            return Err(SessionError::FactoryClosed(self.shared.id));
        }
        let session = Arc::new(InMemorySession {
            id: SessionId::new(),
            factory: Arc::clone(&self.shared),
            options,
            state: Mutex::new(SessionState {
                open: true,
                connected: true,
                ..Default::default()
            }),
        });
        Counters::bump(&self.shared.counters.sessions_opened);
        debug!(factory = %self.shared.id, session = %session.id, "opened session");
        Ok(session)
    }

    pub fn statistics(&self) -> LoadCounts {
        self.shared.counters.snapshot()
    }

    /// Loads served so far, oldest first.
    pub fn load_events(&self) -> Vec<LoadEvent> {
        self.shared
            .events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn inject_faults(&self, faults: FaultInjection) {
        if let Ok(mut current) = self.shared.faults.write() {
            *current = faults;
        }
    }

    /// Stop handing out sessions. Open sessions are not affected.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    /// Make this factory resolvable by id.
    pub fn register(&self, registry: &FactoryRegistry) -> SessionResult<()> {
        registry.register(Arc::new(self.clone()))
    }
}

impl SessionFactory for InMemorySessionFactory {
    fn id(&self) -> FactoryId {
        self.shared.id
    }

    fn options(&self) -> SessionFactoryOptions {
        self.shared.options.clone()
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn open_session(&self, options: SessionOptions) -> SessionResult<Arc<dyn UnitOfWork>> {
        let session: Arc<dyn UnitOfWork> = self.open(options)?;
        Ok(session)
    }
}

impl fmt::Debug for InMemorySessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySessionFactory")
            .field("id", &self.shared.id)
            .field("options", &self.shared.options)
            .field("entities", &self.shared.model.len())
            .finish()
    }
}

#[derive(Default)]
struct SessionState {
    open: bool,
    connected: bool,
    transaction_active: bool,
    read_only: HashSet<EntityKey>,
}

/// A session of an [`InMemorySessionFactory`].
pub struct InMemorySession {
    id: SessionId,
    factory: Arc<FactoryShared>,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl InMemorySession {
    fn state(&self) -> SessionResult<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|e| SessionError::Internal(format!("lock poisoned: {e}")))
    }

    fn open_state(&self) -> SessionResult<MutexGuard<'_, SessionState>> {
        let state = self.state()?;
        if !state.open {
            return Err(SessionError::Closed(self.id));
        }
        Ok(state)
    }

    /// Give up the connection while staying open.
    pub fn disconnect(&self) -> SessionResult<()> {
        self.open_state()?.connected = false;
        Ok(())
    }

    pub fn reconnect(&self) -> SessionResult<()> {
        self.open_state()?.connected = true;
        Ok(())
    }

    pub fn is_registered_read_only(&self, key: &EntityKey) -> bool {
        self.state()
            .map(|s| s.read_only.contains(key))
            .unwrap_or(false)
    }

}

impl UnitOfWork for InMemorySession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn factory_id(&self) -> Option<FactoryId> {
        Some(self.factory.id)
    }

    fn factory_options(&self) -> SessionFactoryOptions {
        self.factory.options.clone()
    }

    fn options(&self) -> SessionOptions {
        self.options
    }

    fn is_open(&self) -> bool {
        self.state().map(|s| s.open).unwrap_or(false)
    }

    fn is_connected(&self) -> bool {
        self.state().map(|s| s.open && s.connected).unwrap_or(false)
    }

    fn is_transaction_active(&self) -> bool {
        self.state().map(|s| s.transaction_active).unwrap_or(false)
    }

    fn begin_transaction(&self) -> SessionResult<()> {
        let mut state = self.open_state()?;
        if state.transaction_active {
            return Err(SessionError::TransactionAlreadyActive(self.id));
        }
        if self.factory.faults().fail_begin {
            return Err(SessionError::Storage("injected begin failure".into()));
        }
        state.transaction_active = true;
        Counters::bump(&self.factory.counters.transactions_begun);
        Ok(())
    }

    fn commit(&self) -> SessionResult<()> {
        let mut state = self.open_state()?;
        if !state.transaction_active {
            return Err(SessionError::NoActiveTransaction(self.id));
        }
        state.transaction_active = false;
        if self.factory.faults().fail_commit {
            return Err(SessionError::Storage("injected commit failure".into()));
        }
        Counters::bump(&self.factory.counters.commits);
        Ok(())
    }

    fn rollback(&self) -> SessionResult<()> {
        let mut state = self.open_state()?;
        if !state.transaction_active {
            return Err(SessionError::NoActiveTransaction(self.id));
        }
        state.transaction_active = false;
        if self.factory.faults().fail_rollback {
            return Err(SessionError::Storage("injected rollback failure".into()));
        }
        Counters::bump(&self.factory.counters.rollbacks);
        Ok(())
    }

    fn close(&self) -> SessionResult<()> {
        let mut state = self.state()?;
        if !state.open {
            return Ok(());
        }
        state.open = false;
        state.connected = false;
        state.transaction_active = false;
        Counters::bump(&self.factory.counters.sessions_closed);
        debug!(session = %self.id, "closed session");
        if self.factory.faults().fail_close {
            return Err(SessionError::Storage("injected close failure".into()));
        }
        Ok(())
    }

    fn persister(&self, entity_name: &str) -> SessionResult<Arc<dyn EntityPersister>> {
        self.open_state()?;
        let entity = self
            .factory
            .model
            .descriptor(entity_name)
            .map_err(|_| SessionError::UnknownPersister(entity_name.to_string()))?;
        Ok(Arc::new(InMemoryPersister {
            entity: Arc::clone(entity),
            factory: Arc::clone(&self.factory),
        }))
    }

    fn register_read_only(&self, key: &EntityKey) -> SessionResult<()> {
        self.open_state()?.read_only.insert(key.clone());
        Ok(())
    }
}

impl fmt::Debug for InMemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySession")
            .field("id", &self.id)
            .field("factory", &self.factory.id)
            .field("open", &self.is_open())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Loads entity state from an [`InMemorySessionFactory`]'s rows.
pub struct InMemoryPersister {
    entity: Arc<EntityDescriptor>,
    factory: Arc<FactoryShared>,
}

impl InMemoryPersister {
    fn check(&self, session: &dyn UnitOfWork) -> SessionResult<()> {
        if !session.is_open() {
            return Err(SessionError::Closed(session.id()));
        }
        if !session.is_connected() {
            return Err(SessionError::Disconnected(session.id()));
        }
        if self.factory.faults().fail_load {
            return Err(SessionError::Storage("injected load failure".into()));
        }
        Ok(())
    }
}

impl EntityPersister for InMemoryPersister {
    fn entity_name(&self) -> &str {
        self.entity.name()
    }

    fn initialize_enhanced_entity_used_as_proxy(
        &self,
        target: &mut dyn ManagedEntity,
        key: &EntityKey,
        triggering_attribute: &str,
        session: &dyn UnitOfWork,
    ) -> SessionResult<()> {
        self.check(session)?;
        let mut row = self.factory.row(key)?;
        let fetch_groups = self.entity.fetch_groups();

        for attribute in &self.entity.mapping().attributes {
            if fetch_groups.is_lazy_attribute(&attribute.name) {
                continue;
            }
            let value = row.remove(&attribute.name).unwrap_or_default();
            target.set(&attribute.name, value);
        }
        for name in self.entity.related_state().identifier_attribute_names() {
            let value = key
                .identifier()
                .part(name)
                .map_err(|e| SessionError::Storage(e.to_string()))?;
            target.set(name, value.clone());
        }

        Counters::bump(&self.factory.counters.full_loads);
        self.factory.record(LoadEvent::FullState {
            key: key.clone(),
            triggered_by: triggering_attribute.to_string(),
        })?;
        debug!(%key, attribute = triggering_attribute, "loaded base state");
        Ok(())
    }

    fn initialize_lazy_property(
        &self,
        attribute: &str,
        target: &mut dyn ManagedEntity,
        key: &EntityKey,
        session: &dyn UnitOfWork,
    ) -> SessionResult<Value> {
        self.check(session)?;
        let fetch_groups = self.entity.fetch_groups();
        // An attribute outside every lazy group (one a fetch graph left out
        // of the initial load) is fetched on its own.
        let (group, members) = match fetch_groups.descriptor(attribute) {
            Some(descriptor) => (
                descriptor.fetch_group_name().to_string(),
                fetch_groups
                    .group(descriptor.fetch_group_name())
                    .iter()
                    .map(|d| d.name().to_string())
                    .collect::<Vec<_>>(),
            ),
            None if self.entity.mapping().attribute_named(attribute).is_some() => {
                (attribute.to_string(), vec![attribute.to_string()])
            }
            None => {
                return Err(SessionError::UnknownAttribute {
                    entity: self.entity.name().to_string(),
                    attribute: attribute.to_string(),
                })
            }
        };
        let row = self.factory.row(key)?;

        for member in &members {
            let value = row.get(member).cloned().unwrap_or_default();
            target.set(member, value);
        }

        Counters::bump(&self.factory.counters.group_loads);
        debug!(%key, group = %group, "loaded fetch group");
        self.factory.record(LoadEvent::FetchGroup {
            key: key.clone(),
            group,
            attributes: members,
        })?;
        Ok(row.get(attribute).cloned().unwrap_or_default())
    }
}

impl fmt::Debug for InMemoryPersister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPersister")
            .field("entity", &self.entity.name())
            .finish()
    }
}
