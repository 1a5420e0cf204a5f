//! Tempo Core - Fundamental types for the Tempo scheduler.
//!
//! This crate provides the foundational types the rest of Tempo depends on:
//! the component-keyed model data, the unified `Value` representation, the
//! clonable `Task` unit of work, and the shared error types.

pub mod error;
pub mod model;
pub mod types;

pub use error::{RuntimeError, RuntimeResult};
pub use model::{ChangeListener, ComponentDelta, ModelData};
pub use types::{ComponentId, InstructionId, Number, Task, TaskFn, Value};
