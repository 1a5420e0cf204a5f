//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the out-of-order processor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Abort the remaining batch on the first task-closure failure.
    ///
    /// In the default lenient mode `process_all_tasks` logs a failure and
    /// keeps draining the ready queue; the failing instruction counts as
    /// executed either way and its successors proceed.
    #[serde(default)]
    pub strict_failures: bool,
}

impl SchedulerConfig {
    /// Sets the strict failure mode.
    pub fn with_strict_failures(mut self, strict: bool) -> Self {
        self.strict_failures = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_lenient() {
        assert!(!SchedulerConfig::default().strict_failures);
        assert!(SchedulerConfig::default()
            .with_strict_failures(true)
            .strict_failures);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert!(!config.strict_failures);
    }
}
