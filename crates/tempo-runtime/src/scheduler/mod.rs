//! Out-of-order task scheduler.
//!
//! This module implements a dependency-tracking scheduler that:
//! - derives true data dependencies from declared read/write sets
//! - partitions eligible instructions by integer priority
//! - samples priorities with a deterministic, fair sawtooth generator
//! - runs every task against an isolated time-capsule snapshot
//! - fuses adjacent compatible instructions through registered rewriters

pub mod config;
pub mod generator;
pub mod processor;
pub mod queue;
pub mod rewrite;

// Internal DAG node representation (not part of the public API).
pub(crate) mod instruction;

// Public exports
pub use config::SchedulerConfig;
pub use generator::PriorityGenerator;
pub use processor::{OutOfOrderProcessor, SchedulerStats};
pub use queue::ReadyQueue;
pub use rewrite::{SimpleTaskRewriter, TaskRewriter};
