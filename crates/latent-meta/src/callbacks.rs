//! Lifecycle callback tables.
//!
//! Callbacks are registered explicitly per entity type while the metamodel
//! is built and are dispatched through one table indexed by
//! [`CallbackKind`].

use std::fmt;
use std::sync::Arc;

use latent_types::ManagedEntity;

/// Lifecycle event a callback is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallbackKind {
    PrePersist,
    PostPersist,
    PreUpdate,
    PostUpdate,
    PreRemove,
    PostRemove,
    PostLoad,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 7] = [
        Self::PrePersist,
        Self::PostPersist,
        Self::PreUpdate,
        Self::PostUpdate,
        Self::PreRemove,
        Self::PostRemove,
        Self::PostLoad,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrePersist => "pre-persist",
            Self::PostPersist => "post-persist",
            Self::PreUpdate => "pre-update",
            Self::PostUpdate => "post-update",
            Self::PreRemove => "pre-remove",
            Self::PostRemove => "post-remove",
            Self::PostLoad => "post-load",
        };
        f.write_str(name)
    }
}

/// A lifecycle callback. Receives the managed object's raw storage.
pub type Callback = Arc<dyn Fn(&mut dyn ManagedEntity) + Send + Sync>;

/// Callbacks of one entity type, one ordered list per [`CallbackKind`].
#[derive(Clone, Default)]
pub struct CallbackTable {
    slots: [Vec<Callback>; CallbackKind::ALL.len()],
}

impl CallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback; callbacks of one kind fire in registration order.
    pub fn register(&mut self, kind: CallbackKind, callback: Callback) {
        self.slots[kind.slot()].push(callback);
    }

    pub fn has(&self, kind: CallbackKind) -> bool {
        !self.slots[kind.slot()].is_empty()
    }

    pub fn len(&self, kind: CallbackKind) -> usize {
        self.slots[kind.slot()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    /// Invoke every callback bound to `kind`. Returns how many ran.
    pub fn fire(&self, kind: CallbackKind, entity: &mut dyn ManagedEntity) -> usize {
        let callbacks = &self.slots[kind.slot()];
        for callback in callbacks {
            callback(&mut *entity);
        }
        callbacks.len()
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in CallbackKind::ALL {
            if self.has(kind) {
                map.entry(&kind, &self.len(kind));
            }
        }
        map.finish()
    }
}
