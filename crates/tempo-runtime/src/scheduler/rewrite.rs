//! Peephole fusion of adjacent instructions.
//!
//! A rewriter decides whether two tasks whose instructions are adjacent in
//! the dependency DAG (the first an immediate predecessor of the second) can
//! be fused, and produces the fused task. The processor tries registered
//! rewriters in registration order; the first accepting one wins.

use std::sync::Arc;

use tempo_core::Task;

/// Predicate and fusion of two adjacent tasks.
pub trait TaskRewriter: Send + Sync {
    /// Whether `first` (an immediate DAG predecessor of `second`) can be
    /// fused with it.
    fn can_merge(&self, first: &Task, second: &Task) -> bool;

    /// Fuses two mergeable tasks into one.
    ///
    /// The returned task must read at least
    /// `first.reads ∪ (second.reads − first.writes)` and write exactly
    /// `first.writes ∪ second.writes`; [`Task::then`] produces precisely
    /// these sets.
    fn merge(&self, first: &Task, second: &Task) -> Task;
}

/// Rewriter wrapping a predicate closure and a merge closure.
pub struct SimpleTaskRewriter {
    predicate: Arc<dyn Fn(&Task, &Task) -> bool + Send + Sync>,
    merge: Arc<dyn Fn(&Task, &Task) -> Task + Send + Sync>,
}

impl SimpleTaskRewriter {
    /// Creates a rewriter from a predicate and a merge function.
    pub fn new(
        predicate: impl Fn(&Task, &Task) -> bool + Send + Sync + 'static,
        merge: impl Fn(&Task, &Task) -> Task + Send + Sync + 'static,
    ) -> Self {
        SimpleTaskRewriter {
            predicate: Arc::new(predicate),
            merge: Arc::new(merge),
        }
    }
}

impl TaskRewriter for SimpleTaskRewriter {
    fn can_merge(&self, first: &Task, second: &Task) -> bool {
        (self.predicate)(first, second)
    }

    fn merge(&self, first: &Task, second: &Task) -> Task {
        (self.merge)(first, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo_core::{ComponentId, ModelData, Value};

    #[test]
    fn test_simple_rewriter_delegates() {
        let rewriter = SimpleTaskRewriter::new(
            |first, second| first.writes() == second.writes(),
            |first, second| first.then(second),
        );

        let set_one = Task::new(
            |data| {
                data.set(ComponentId::DataGraph, Value::from(1i64));
                Ok(())
            },
            vec![],
            vec![ComponentId::DataGraph],
        );
        let set_two = Task::new(
            |data| {
                data.set(ComponentId::DataGraph, Value::from(2i64));
                Ok(())
            },
            vec![],
            vec![ComponentId::DataGraph],
        );
        let other = Task::new(|_| Ok(()), vec![], vec![ComponentId::UI]);

        assert!(rewriter.can_merge(&set_one, &set_two));
        assert!(!rewriter.can_merge(&set_one, &other));

        let fused = rewriter.merge(&set_one, &set_two);
        let mut data = ModelData::new();
        fused.execute(&mut data).unwrap();
        assert_eq!(data.get(ComponentId::DataGraph), Some(&Value::from(2i64)));
        assert_eq!(fused.writes(), &[ComponentId::DataGraph]);
    }
}
