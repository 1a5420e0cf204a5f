//! Out-of-order processor.
//!
//! The processor converts submitted tasks into instructions linked by a
//! dependency DAG, selects the next eligible instruction through the
//! priority-partitioned ready queue, optionally fuses it with adjacent
//! mergeable instructions, executes the task against its captured
//! time-capsule snapshot, transfers produced values to dependent
//! instructions along the DAG edges, and retires it.
//!
//! Dependency derivation follows the declared read/write sets: a writer
//! depends on the latest writer of each written component (write-after-write
//! order) and on its latest reader when that reader is a different
//! instruction (write-after-read order, so the reader observes the prior
//! value before it is overwritten); a reader depends on the latest writer of
//! each read component (the true data dependency).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use tempo_core::{
    ComponentId, InstructionId, ModelData, RuntimeError, RuntimeResult, Task,
};

use crate::capsule::TimeCapsule;
use crate::scheduler::config::SchedulerConfig;
use crate::scheduler::instruction::{DeltaLog, Instruction};
use crate::scheduler::queue::ReadyQueue;
use crate::scheduler::rewrite::TaskRewriter;

/// Instruction indices wrap at `i32::MAX`; they are identity only.
const INDEX_LIMIT: u32 = i32::MAX as u32;

/// Counters describing processor activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks accepted by `schedule`.
    pub scheduled: usize,
    /// Instructions executed (fused runs count once).
    pub executed: usize,
    /// Instructions whose task closure failed.
    pub failed: usize,
    /// Pairwise fusions performed by registered rewriters.
    pub fused: usize,
}

/// Dependency-tracking scheduler executing tasks against snapshots of the
/// shared model data.
pub struct OutOfOrderProcessor {
    config: SchedulerConfig,
    /// The post-schedule latest instant: the state a newly scheduled task
    /// logically sees after every already-scheduled task completes.
    latest: TimeCapsule<ModelData>,
    instructions: HashMap<InstructionId, Instruction>,
    latest_writer: HashMap<ComponentId, InstructionId>,
    latest_reader: HashMap<ComponentId, InstructionId>,
    ready: ReadyQueue,
    rewriters: Vec<Box<dyn TaskRewriter>>,
    next_index: InstructionId,
    stats: SchedulerStats,
}

impl OutOfOrderProcessor {
    /// Creates a processor over the given model data.
    pub fn new(model: ModelData) -> Self {
        Self::with_config(model, SchedulerConfig::default())
    }

    /// Creates a processor with an explicit configuration.
    pub fn with_config(model: ModelData, config: SchedulerConfig) -> Self {
        OutOfOrderProcessor {
            config,
            latest: TimeCapsule::new(model),
            instructions: HashMap::new(),
            latest_writer: HashMap::new(),
            latest_reader: HashMap::new(),
            ready: ReadyQueue::new(),
            rewriters: Vec::new(),
            next_index: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Registers a rewriter; earlier registrations are tried first.
    pub fn register_rewriter(&mut self, rewriter: Box<dyn TaskRewriter>) {
        self.rewriters.push(rewriter);
    }

    /// Returns `true` iff no instruction is pending.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Activity counters.
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Runs `f` against the live model buffer.
    ///
    /// No snapshot repositioning takes place; this observes the data as the
    /// executed instructions left it.
    pub fn with_model<R>(&self, f: impl FnOnce(&mut ModelData) -> R) -> R {
        self.latest.with_data(f)
    }

    /// Wraps a task into an instruction, links it into the DAG, and advances
    /// the post-schedule instant.
    pub fn schedule(&mut self, task: Task) -> InstructionId {
        let id = self.allocate_index();
        let log: DeltaLog = Arc::new(Mutex::new(None));
        let mut instruction =
            Instruction::new(id, task.clone(), self.latest.clone(), Arc::clone(&log));

        for &component in task.writes() {
            if let Some(&writer) = self.latest_writer.get(&component) {
                instruction.add_dependency(writer, component);
            }
            if let Some(&reader) = self.latest_reader.get(&component) {
                if self.latest_writer.get(&component) != Some(&reader) {
                    instruction.add_dependency(reader, component);
                }
            }
        }
        for &component in task.reads() {
            if let Some(&writer) = self.latest_writer.get(&component) {
                instruction.add_dependency(writer, component);
            }
        }

        for &predecessor in instruction.dependencies.keys() {
            if let Some(source) = self.instructions.get_mut(&predecessor) {
                source.dependents.insert(id);
            }
        }
        for &component in task.writes() {
            self.latest_writer.insert(component, id);
        }
        for &component in task.reads() {
            self.latest_reader.insert(component, id);
        }

        // Advance the post-schedule instant. The redo thunk runs the task
        // under capture the first time the instant is materialized and
        // replays the recorded deltas on every later visit; undo reverts
        // them in reverse.
        let redo = {
            let task = task.clone();
            let log = Arc::clone(&log);
            move |data: &mut ModelData| {
                let mut entry = log.lock();
                match entry.as_ref() {
                    Some(deltas) => {
                        for delta in deltas {
                            data.apply_forward(delta);
                        }
                    }
                    None => {
                        data.begin_capture();
                        if let Err(error) = task.execute(data) {
                            warn!(error = %error, "task closure failed during snapshot replay");
                        }
                        *entry = Some(data.end_capture());
                    }
                }
            }
        };
        let undo = {
            let log = Arc::clone(&log);
            move |data: &mut ModelData| {
                if let Some(deltas) = log.lock().as_ref() {
                    for delta in deltas.iter().rev() {
                        data.apply_backward(delta);
                    }
                }
            }
        };
        self.latest = self.latest.modify(redo, undo);

        let priority = task.priority();
        let eligible = instruction.is_ready();
        debug!(
            instruction = id,
            priority,
            reads = ?task.reads(),
            writes = ?task.writes(),
            eligible,
            "scheduled task"
        );
        self.instructions.insert(id, instruction);
        if eligible {
            self.ready.enqueue(id, priority);
        }
        self.stats.scheduled += 1;
        id
    }

    /// Executes the next eligible instruction.
    ///
    /// Returns `Ok(false)` when the ready queue is empty. A task-closure
    /// failure is surfaced as [`RuntimeError::TaskClosure`] after the
    /// instruction has retired; its successors proceed regardless.
    pub fn process_task(&mut self) -> RuntimeResult<bool> {
        let Some(id) = self.ready.dequeue() else {
            return Ok(false);
        };
        let id = self.apply_rewriters(id);

        let instruction = self.instructions.get(&id).ok_or_else(|| {
            RuntimeError::State(format!("dequeued unknown instruction {id}"))
        })?;
        let task = instruction.task.clone();
        let snapshot = instruction.snapshot.clone();
        let logs = instruction.logs.clone();
        let dependents: Vec<InstructionId> = instruction.dependents.iter().copied().collect();

        // Edges carry the components this instruction supplies to each
        // successor; a dependent without a matching edge is a caller error.
        let mut edges: Vec<(InstructionId, Vec<ComponentId>)> =
            Vec::with_capacity(dependents.len());
        for successor in dependents {
            let target = self.instructions.get(&successor).ok_or_else(|| {
                RuntimeError::State(format!(
                    "instruction {id} lists unknown dependent {successor}"
                ))
            })?;
            let components = target
                .dependencies
                .get(&id)
                .map(|set| {
                    let mut components: Vec<_> = set.iter().copied().collect();
                    components.sort();
                    components
                })
                .ok_or(RuntimeError::IndependentTransfer {
                    from: id,
                    to: successor,
                })?;
            edges.push((successor, components));
        }

        trace!(instruction = id, "executing instruction");
        let outcome = snapshot.query(|data| {
            // Discard writes accumulated by snapshot replay; only this
            // task's own writes reach the listeners.
            data.take_written();
            data.begin_capture();
            let result = task.execute(data);
            let deltas = data.end_capture();
            let written = data.take_written();

            // Seal the history: instants covered by fusion become empty,
            // the instruction's own instant holds the captured deltas.
            if let Some((own, covered)) = logs.split_last() {
                for log in covered {
                    *log.lock() = Some(Vec::new());
                }
                *own.lock() = Some(deltas);
            }

            // Transfer outputs, scoped to the components on each edge.
            for (_successor, components) in &edges {
                for &component in components {
                    if let Some(value) = data.get(component).cloned() {
                        data.set_unchecked(component, value);
                    }
                }
            }

            data.notify_changes(&written);
            result
        })?;

        // Retire: drop the outgoing edges, enqueue newly eligible
        // successors, release the latest-access slots still pointing here.
        for (successor, _components) in &edges {
            if let Some(target) = self.instructions.get_mut(successor) {
                target.dependencies.remove(&id);
                if target.is_ready() {
                    self.ready.enqueue(*successor, target.task.priority());
                }
            }
        }
        self.instructions.remove(&id);
        self.latest_writer.retain(|_, writer| *writer != id);
        self.latest_reader.retain(|_, reader| *reader != id);
        self.stats.executed += 1;

        match outcome {
            Ok(()) => {
                trace!(instruction = id, "instruction retired");
                Ok(true)
            }
            Err(error) => {
                self.stats.failed += 1;
                warn!(instruction = id, error = %error, "task closure failed");
                let message = match error {
                    RuntimeError::TaskClosure { message } => message,
                    other => other.to_string(),
                };
                Err(RuntimeError::TaskClosure { message })
            }
        }
    }

    /// Loops [`process_task`](Self::process_task) until no work remains.
    ///
    /// Task-closure failures abort the batch only in strict mode; any other
    /// error is fatal and propagates immediately.
    pub fn process_all_tasks(&mut self) -> RuntimeResult<()> {
        loop {
            match self.process_task() {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(error @ RuntimeError::TaskClosure { .. }) => {
                    if self.config.strict_failures {
                        return Err(error);
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn allocate_index(&mut self) -> InstructionId {
        let id = self.next_index;
        self.next_index = (self.next_index + 1) % INDEX_LIMIT;
        id
    }

    /// Pre-execution fusion: coalesces the just-dequeued instruction with
    /// successors whose only remaining dependency it is, as long as a
    /// registered rewriter accepts the pair. Returns the instruction to
    /// execute (the final merge result, or the original when nothing fused).
    fn apply_rewriters(&mut self, start: InstructionId) -> InstructionId {
        if self.rewriters.is_empty() {
            return start;
        }
        let mut current = start;
        loop {
            let Some(instruction) = self.instructions.get(&current) else {
                return current;
            };
            let mut fusion: Option<(InstructionId, usize)> = None;
            'scan: for &successor in &instruction.dependents {
                let Some(target) = self.instructions.get(&successor) else {
                    continue;
                };
                if target.dependencies.len() != 1 || !target.dependencies.contains_key(&current)
                {
                    continue;
                }
                for (index, rewriter) in self.rewriters.iter().enumerate() {
                    if rewriter.can_merge(&instruction.task, &target.task) {
                        fusion = Some((successor, index));
                        break 'scan;
                    }
                }
            }
            let Some((successor, rewriter_index)) = fusion else {
                return current;
            };
            current = self.splice(current, successor, rewriter_index);
        }
    }

    /// Replaces `first` and `second` (with `second` depending only on
    /// `first`) by one merged instruction carrying the fused task, the
    /// snapshot of `first`, and the delta logs of both.
    fn splice(
        &mut self,
        first_id: InstructionId,
        second_id: InstructionId,
        rewriter_index: usize,
    ) -> InstructionId {
        let merged_task = {
            let (Some(first), Some(second)) = (
                self.instructions.get(&first_id),
                self.instructions.get(&second_id),
            ) else {
                return first_id;
            };
            self.rewriters[rewriter_index].merge(&first.task, &second.task)
        };
        let Some(first) = self.instructions.remove(&first_id) else {
            return first_id;
        };
        let Some(second) = self.instructions.remove(&second_id) else {
            return first_id;
        };

        let id = self.allocate_index();
        let mut logs = first.logs;
        logs.extend(second.logs);
        let mut merged = Instruction {
            id,
            task: merged_task,
            snapshot: first.snapshot,
            logs,
            dependencies: HashMap::new(),
            dependents: BTreeSet::new(),
        };

        let successors: BTreeSet<InstructionId> = first
            .dependents
            .iter()
            .chain(second.dependents.iter())
            .copied()
            .filter(|&successor| successor != second_id)
            .collect();
        for successor in successors {
            if let Some(target) = self.instructions.get_mut(&successor) {
                let mut components: HashSet<ComponentId> = HashSet::new();
                if let Some(set) = target.dependencies.remove(&first_id) {
                    components.extend(set);
                }
                if let Some(set) = target.dependencies.remove(&second_id) {
                    components.extend(set);
                }
                if !components.is_empty() {
                    target.dependencies.insert(id, components);
                    merged.dependents.insert(successor);
                }
            }
        }

        for writer in self.latest_writer.values_mut() {
            if *writer == first_id || *writer == second_id {
                *writer = id;
            }
        }
        for reader in self.latest_reader.values_mut() {
            if *reader == first_id || *reader == second_id {
                *reader = id;
            }
        }

        self.stats.fused += 1;
        debug!(
            first = first_id,
            second = second_id,
            merged = id,
            "fused adjacent instructions"
        );
        self.instructions.insert(id, merged);
        id
    }
}
