//! Tempo Runtime - Out-of-order dataflow task scheduler.
//!
//! This crate provides the scheduling machinery built on top of
//! `tempo-core`: the time capsule (snapshot-by-delta over the mutable model
//! data), the priority generator and priority-partitioned ready queue, the
//! task rewriter protocol, and the out-of-order processor that ties them
//! together.

pub mod capsule;
pub mod scheduler;

pub use capsule::TimeCapsule;
pub use scheduler::{
    OutOfOrderProcessor, PriorityGenerator, ReadyQueue, SchedulerConfig, SchedulerStats,
    SimpleTaskRewriter, TaskRewriter,
};
