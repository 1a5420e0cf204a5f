//! Dependency-DAG node wrapping one scheduled task.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use tempo_core::{ComponentDelta, ComponentId, InstructionId, ModelData, Task};

use crate::capsule::TimeCapsule;

/// Shared record of the deltas one history instant applies.
///
/// `None` until the instant has been materialized for the first time, either
/// by the processor executing its instruction or by a snapshot replay
/// running the task; afterwards redo replays the recorded deltas instead of
/// re-running the closure.
pub(crate) type DeltaLog = Arc<Mutex<Option<Vec<ComponentDelta>>>>;

/// One node of the dependency DAG.
///
/// Holds the owned task, the captured snapshot of the model (the
/// post-schedule instant at scheduling time), the incoming edges with the
/// components each predecessor supplies, and the outgoing edge targets.
pub(crate) struct Instruction {
    pub(crate) id: InstructionId,
    pub(crate) task: Task,
    pub(crate) snapshot: TimeCapsule<ModelData>,
    /// Delta logs of the history instants this instruction materializes.
    ///
    /// Normally a single entry (the instruction's own modify instant);
    /// fusion concatenates the covered chains. The last entry receives the
    /// execution capture, earlier ones are sealed empty.
    pub(crate) logs: Vec<DeltaLog>,
    /// Predecessor instruction -> components it supplies to this one.
    pub(crate) dependencies: HashMap<InstructionId, HashSet<ComponentId>>,
    /// Successor instructions, ordered for deterministic rewrite scans.
    pub(crate) dependents: BTreeSet<InstructionId>,
}

impl Instruction {
    pub(crate) fn new(
        id: InstructionId,
        task: Task,
        snapshot: TimeCapsule<ModelData>,
        log: DeltaLog,
    ) -> Self {
        Instruction {
            id,
            task,
            snapshot,
            logs: vec![log],
            dependencies: HashMap::new(),
            dependents: BTreeSet::new(),
        }
    }

    /// Records that `predecessor` supplies `component` to this instruction.
    pub(crate) fn add_dependency(&mut self, predecessor: InstructionId, component: ComponentId) {
        self.dependencies
            .entry(predecessor)
            .or_default()
            .insert(component);
    }

    /// An instruction is ready once its dependency map is empty.
    pub(crate) fn is_ready(&self) -> bool {
        self.dependencies.is_empty()
    }
}
