//! Component-keyed model data with change tracking.
//!
//! `ModelData` maps component identifiers to opaque values. Mutations made
//! through the checked entry points (`set`, `get_or_create`) are recorded
//! into an optional capture log as reversible deltas and accumulated into a
//! written set; the scheduler drains both around each task execution. The
//! unchecked entry point (`set_unchecked`) bypasses tracking entirely and is
//! used when transferring outputs between instructions.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::types::{ComponentId, Value};

/// Listener invoked with the set of components a completed task wrote.
pub type ChangeListener = Arc<dyn Fn(&HashSet<ComponentId>) + Send + Sync>;

/// A reversible record of one component mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentDelta {
    /// Component that was mutated.
    pub component: ComponentId,
    /// Value before the mutation, or `None` if the component was absent.
    pub previous: Option<Value>,
    /// Value after the mutation, or `None` if the component was removed.
    pub next: Option<Value>,
}

/// The shared, component-structured data store tasks operate on.
#[derive(Default)]
pub struct ModelData {
    components: HashMap<ComponentId, Value>,
    capture: Option<Vec<ComponentDelta>>,
    written: HashSet<ComponentId>,
    listeners: Vec<ChangeListener>,
}

impl ModelData {
    /// Creates empty model data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a component, or `None` if it was never set.
    pub fn get(&self, id: ComponentId) -> Option<&Value> {
        self.components.get(&id)
    }

    /// Replaces the value of a component.
    ///
    /// Recorded into the active capture log and the written set.
    pub fn set(&mut self, id: ComponentId, value: Value) {
        let previous = if self.capture.is_some() {
            self.components.get(&id).cloned()
        } else {
            None
        };
        if let Some(log) = self.capture.as_mut() {
            log.push(ComponentDelta {
                component: id,
                previous,
                next: Some(value.clone()),
            });
        }
        self.written.insert(id);
        self.components.insert(id, value);
    }

    /// Returns the existing value of a component, or installs `factory()`.
    ///
    /// An install counts as a write; reading an existing value does not.
    pub fn get_or_create(&mut self, id: ComponentId, factory: impl FnOnce() -> Value) -> &Value {
        match self.components.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let value = factory();
                if let Some(log) = self.capture.as_mut() {
                    log.push(ComponentDelta {
                        component: id,
                        previous: None,
                        next: Some(value.clone()),
                    });
                }
                self.written.insert(id);
                entry.insert(value)
            }
        }
    }

    /// Replaces the value of a component without recording the change.
    ///
    /// Used by the scheduler when transferring outputs across instructions;
    /// the write appears in no capture log and no written set.
    pub fn set_unchecked(&mut self, id: ComponentId, value: Value) {
        self.components.insert(id, value);
    }

    /// Registers a listener for per-task written-component notifications.
    pub fn observe_changes(&mut self, listener: ChangeListener) {
        self.listeners.push(listener);
    }

    /// Starts a fresh capture log, replacing any active one.
    pub fn begin_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stops capturing and returns the recorded deltas.
    pub fn end_capture(&mut self) -> Vec<ComponentDelta> {
        self.capture.take().unwrap_or_default()
    }

    /// Drains the set of components written since the last drain.
    pub fn take_written(&mut self) -> HashSet<ComponentId> {
        std::mem::take(&mut self.written)
    }

    /// Invokes every registered listener with a written-component set.
    pub fn notify_changes(&self, written: &HashSet<ComponentId>) {
        for listener in &self.listeners {
            listener(written);
        }
    }

    /// Re-applies a recorded delta (sets the `next` state).
    pub fn apply_forward(&mut self, delta: &ComponentDelta) {
        match &delta.next {
            Some(value) => {
                self.components.insert(delta.component, value.clone());
            }
            None => {
                self.components.remove(&delta.component);
            }
        }
    }

    /// Reverts a recorded delta (restores the `previous` state).
    pub fn apply_backward(&mut self, delta: &ComponentDelta) {
        match &delta.previous {
            Some(value) => {
                self.components.insert(delta.component, value.clone());
            }
            None => {
                self.components.remove(&delta.component);
            }
        }
    }
}

impl fmt::Debug for ModelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelData")
            .field("components", &self.components)
            .field("capturing", &self.capture.is_some())
            .field("written", &self.written)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_set_and_get() {
        let mut data = ModelData::new();
        assert!(data.get(ComponentId::DataGraph).is_none());

        data.set(ComponentId::DataGraph, Value::from(1i64));
        assert_eq!(data.get(ComponentId::DataGraph), Some(&Value::from(1i64)));
    }

    #[test]
    fn test_get_or_create_installs_once() {
        let mut data = ModelData::new();
        let value = data.get_or_create(ComponentId::UI, || Value::from("fresh"));
        assert_eq!(value, &Value::from("fresh"));

        // Second call must keep the installed value.
        let value = data.get_or_create(ComponentId::UI, || Value::from("ignored"));
        assert_eq!(value, &Value::from("fresh"));
    }

    #[test]
    fn test_capture_records_reversible_deltas() {
        let mut data = ModelData::new();
        data.set(ComponentId::IO, Value::from(1i64));

        data.begin_capture();
        data.set(ComponentId::IO, Value::from(2i64));
        data.get_or_create(ComponentId::UI, || Value::from(true));
        let deltas = data.end_capture();

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].previous, Some(Value::from(1i64)));
        assert_eq!(deltas[0].next, Some(Value::from(2i64)));
        assert_eq!(deltas[1].previous, None);

        // Reverting in reverse order restores the pre-capture state.
        for delta in deltas.iter().rev() {
            data.apply_backward(delta);
        }
        assert_eq!(data.get(ComponentId::IO), Some(&Value::from(1i64)));
        assert!(data.get(ComponentId::UI).is_none());
    }

    #[test]
    fn test_set_unchecked_bypasses_tracking() {
        let mut data = ModelData::new();
        data.take_written();

        data.begin_capture();
        data.set_unchecked(ComponentId::DataGraph, Value::from(9i64));
        let deltas = data.end_capture();

        assert!(deltas.is_empty());
        assert!(data.take_written().is_empty());
        assert_eq!(data.get(ComponentId::DataGraph), Some(&Value::from(9i64)));
    }

    #[test]
    fn test_written_set_drains() {
        let mut data = ModelData::new();
        data.set(ComponentId::DataGraph, Value::from(1i64));
        data.set(ComponentId::IO, Value::from(2i64));

        let written = data.take_written();
        assert!(written.contains(&ComponentId::DataGraph));
        assert!(written.contains(&ComponentId::IO));
        assert!(data.take_written().is_empty());
    }

    #[test]
    fn test_listeners_receive_written_components() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut data = ModelData::new();
        data.observe_changes(Arc::new(move |written: &HashSet<ComponentId>| {
            let mut components: Vec<_> = written.iter().copied().collect();
            components.sort();
            sink.lock().unwrap().push(components);
        }));

        data.set(ComponentId::ValidationReport, Value::Null);
        let written = data.take_written();
        data.notify_changes(&written);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[vec![ComponentId::ValidationReport]]);
    }
}
