use std::collections::BTreeMap;

use crate::value::Value;

/// Raw attribute storage of a managed object.
///
/// Everything here bypasses interception: it is the object's own storage,
/// which becomes authoritative for an attribute once that attribute is
/// initialized. Interceptors and persisters use it to read the current field
/// value, write loaded state, and replay deferred writes.
pub trait ManagedEntity: Send {
    /// Name of the entity type this object is an instance of.
    fn entity_name(&self) -> &str;

    /// Current stored value of an attribute, `None` if never set.
    fn get(&self, attribute: &str) -> Option<&Value>;

    /// Overwrite the stored value of an attribute.
    fn set(&mut self, attribute: &str, value: Value);

    /// The in-place dirty tracker, if the object tracks its own changes.
    fn dirty_tracker(&self) -> Option<&DirtyTracker>;

    fn dirty_tracker_mut(&mut self) -> Option<&mut DirtyTracker>;

    /// Whether this object supports in-place dirty tracking.
    fn tracks_dirtiness(&self) -> bool {
        self.dirty_tracker().is_some()
    }
}

/// In-place dirty tracking state of a self-tracking entity.
///
/// Records which attributes were changed (in first-change order) and the
/// size of each collection when it was loaded, so a later flush can detect
/// collection changes without diffing the elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyTracker {
    changed: Vec<String>,
    collection_sizes: BTreeMap<String, usize>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an attribute as changed. Repeated marks are ignored.
    pub fn track_change(&mut self, attribute: &str) {
        if !self.is_dirty(attribute) {
            self.changed.push(attribute.to_string());
        }
    }

    pub fn is_dirty(&self, attribute: &str) -> bool {
        self.changed.iter().any(|a| a == attribute)
    }

    /// Changed attributes in first-change order.
    pub fn dirty_attributes(&self) -> &[String] {
        &self.changed
    }

    pub fn has_dirty_attributes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Forget all tracked changes and collection snapshots.
    pub fn clear(&mut self) {
        self.changed.clear();
        self.collection_sizes.clear();
    }

    /// Remember the loaded size of a collection attribute.
    pub fn snapshot_collection_size(&mut self, attribute: &str, size: usize) {
        self.collection_sizes.insert(attribute.to_string(), size);
    }

    pub fn collection_size(&self, attribute: &str) -> Option<usize> {
        self.collection_sizes.get(attribute).copied()
    }
}

/// A map-backed [`ManagedEntity`].
///
/// Used by the in-memory runtime, the CLI demo, and tests; code generated for
/// concrete entity structs implements [`ManagedEntity`] directly instead.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicEntity {
    entity_name: String,
    values: BTreeMap<String, Value>,
    tracker: Option<DirtyTracker>,
}

impl DynamicEntity {
    /// An empty instance without dirty tracking.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            values: BTreeMap::new(),
            tracker: None,
        }
    }

    /// An empty instance that tracks its own changes.
    pub fn with_dirty_tracking(entity_name: impl Into<String>) -> Self {
        Self {
            tracker: Some(DirtyTracker::new()),
            ..Self::new(entity_name)
        }
    }

    /// Builder-style attribute assignment.
    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.to_string(), value.into());
        self
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

impl ManagedEntity for DynamicEntity {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    fn set(&mut self, attribute: &str, value: Value) {
        self.values.insert(attribute.to_string(), value);
    }

    fn dirty_tracker(&self) -> Option<&DirtyTracker> {
        self.tracker.as_ref()
    }

    fn dirty_tracker_mut(&mut self) -> Option<&mut DirtyTracker> {
        self.tracker.as_mut()
    }
}
