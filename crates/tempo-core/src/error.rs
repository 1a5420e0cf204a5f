//! Runtime errors.
//!
//! This module defines errors that occur while scheduling and executing
//! tasks, including time-capsule positioning failures, invalid output
//! transfers, and user task-closure failures.

use thiserror::Error;

use crate::types::InstructionId;

/// Errors that occur during scheduling and execution.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Time capsule error: the state is held by a different instant.
    #[error("time capsule already acquired by another instant")]
    TimeCapsuleAlreadyAcquired,

    /// Time capsule error: release without a matching acquire.
    #[error("time capsule is not acquired")]
    TimeCapsuleNotAcquired,

    /// Time capsule error: release through an instant that does not hold
    /// the state.
    #[error("time capsule is acquired by a different instant")]
    TimeCapsuleAcquiredElsewhere,

    /// Output transfer to an instruction that does not depend on the source.
    #[error("instruction {to} does not depend on instruction {from}")]
    IndependentTransfer {
        /// Instruction whose outputs were being transferred.
        from: InstructionId,
        /// Target instruction that lists no such dependency.
        to: InstructionId,
    },

    /// A user task closure failed.
    ///
    /// The instruction counts as executed; its successors proceed.
    #[error("task closure failed: {message}")]
    TaskClosure {
        /// Error message produced by the closure.
        message: String,
    },

    /// Scheduler error: general.
    #[error("scheduler error: {message}")]
    Scheduler {
        /// Error message describing the scheduler failure.
        message: String,
    },

    /// Internal state invariant violation. Always fatal.
    #[error("state error: {0}")]
    State(String),
}

/// Convenience alias used across the Tempo crates.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::IndependentTransfer { from: 3, to: 7 };
        assert_eq!(
            err.to_string(),
            "instruction 7 does not depend on instruction 3"
        );

        let err = RuntimeError::TaskClosure {
            message: "boom".to_string(),
        };
        assert!(err.to_string().contains("boom"));
    }
}
