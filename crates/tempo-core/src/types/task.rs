//! Clonable units of work with read/write annotations.
//!
//! A task pairs an opaque closure over the model data with the sets of
//! components it reads and writes and an integer priority. The closure is
//! stored behind a shared reference, so cloning a task is cheap and clones
//! share the same underlying work.

use std::fmt;
use std::sync::Arc;

use crate::error::RuntimeResult;
use crate::model::ModelData;
use crate::types::ComponentId;

/// The closure type executed by a task.
pub type TaskFn = Arc<dyn Fn(&mut ModelData) -> RuntimeResult<()> + Send + Sync>;

/// An opaque, clonable unit of work.
///
/// The closure is only permitted to read components in the read set and
/// write components in the write set; the scheduler derives dependencies
/// from the declared sets and does not enforce them at runtime.
#[derive(Clone)]
pub struct Task {
    closure: TaskFn,
    reads: Vec<ComponentId>,
    writes: Vec<ComponentId>,
    priority: i32,
}

impl Task {
    /// Creates a task with priority 0.
    pub fn new(
        closure: impl Fn(&mut ModelData) -> RuntimeResult<()> + Send + Sync + 'static,
        reads: Vec<ComponentId>,
        writes: Vec<ComponentId>,
    ) -> Self {
        Task {
            closure: Arc::new(closure),
            reads,
            writes,
            priority: 0,
        }
    }

    /// Sets the execution priority (higher runs first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Runs the task closure against the model data.
    pub fn execute(&self, data: &mut ModelData) -> RuntimeResult<()> {
        (self.closure)(data)
    }

    /// Components this task reads.
    pub fn reads(&self) -> &[ComponentId] {
        &self.reads
    }

    /// Components this task writes.
    pub fn writes(&self) -> &[ComponentId] {
        &self.writes
    }

    /// Execution priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Sequential fusion of two tasks.
    ///
    /// The fused closure runs `self` then `other` against the same data.
    /// Its read set is `self.reads ∪ (other.reads − self.writes)` (values
    /// `other` reads that `self` produces are satisfied internally), its
    /// write set is the union, and its priority is the higher of the two.
    pub fn then(&self, other: &Task) -> Task {
        let first = self.clone();
        let second = other.clone();

        let mut reads = self.reads.clone();
        for &c in &other.reads {
            if !self.writes.contains(&c) && !reads.contains(&c) {
                reads.push(c);
            }
        }
        let mut writes = self.writes.clone();
        for &c in &other.writes {
            if !writes.contains(&c) {
                writes.push(c);
            }
        }

        Task {
            closure: Arc::new(move |data: &mut ModelData| {
                first.execute(data)?;
                second.execute(data)
            }),
            reads,
            writes,
            priority: self.priority.max(other.priority),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("priority", &self.priority)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn increment(id: ComponentId) -> Task {
        Task::new(
            move |data| {
                let current = data
                    .get_or_create(id, || Value::from(0i64))
                    .as_i64()
                    .unwrap_or(0);
                data.set(id, Value::from(current + 1));
                Ok(())
            },
            vec![id],
            vec![id],
        )
    }

    #[test]
    fn test_clones_share_the_closure() {
        let task = increment(ComponentId::DataGraph);
        let clone = task.clone();

        let mut data = ModelData::new();
        task.execute(&mut data).unwrap();
        clone.execute(&mut data).unwrap();

        assert_eq!(data.get(ComponentId::DataGraph), Some(&Value::from(2i64)));
        assert_eq!(clone.reads(), task.reads());
        assert_eq!(clone.priority(), task.priority());
    }

    #[test]
    fn test_then_runs_sequentially() {
        let produce = Task::new(
            |data| {
                data.set(ComponentId::IO, Value::from(10i64));
                Ok(())
            },
            vec![],
            vec![ComponentId::IO],
        );
        let double = Task::new(
            |data| {
                let v = data.get(ComponentId::IO).and_then(Value::as_i64).unwrap_or(0);
                data.set(ComponentId::IO, Value::from(v * 2));
                Ok(())
            },
            vec![ComponentId::IO],
            vec![ComponentId::IO],
        );

        let fused = produce.then(&double);
        let mut data = ModelData::new();
        fused.execute(&mut data).unwrap();
        assert_eq!(data.get(ComponentId::IO), Some(&Value::from(20i64)));
    }

    #[test]
    fn test_then_set_algebra() {
        let first = Task::new(|_| Ok(()), vec![ComponentId::UI], vec![ComponentId::DataGraph])
            .with_priority(2);
        let second = Task::new(
            |_| Ok(()),
            vec![ComponentId::DataGraph, ComponentId::IO],
            vec![ComponentId::ValidationReport],
        );

        let fused = first.then(&second);
        // DataGraph is produced by `first`, so it drops out of the reads.
        assert_eq!(fused.reads(), &[ComponentId::UI, ComponentId::IO]);
        assert_eq!(
            fused.writes(),
            &[ComponentId::DataGraph, ComponentId::ValidationReport]
        );
        assert_eq!(fused.priority(), 2);
    }
}
