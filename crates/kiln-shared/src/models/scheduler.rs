//! Scheduler configuration singleton.

use serde::{Deserialize, Serialize};

/// The single authoritative scheduler configuration row.
///
/// Read once per back-pressure decision; both thresholds come from the same
/// read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Window, in minutes, over which node system failures are counted.
    /// Zero or negative disables the check entirely.
    pub node_error_period: i32,
    /// Distinct-job system failures within the window that trigger a pause
    pub max_node_errors: i32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            node_error_period: 1,
            max_node_errors: 5,
        }
    }
}

impl SchedulerSettings {
    /// True when the node error-rate check is enabled at all
    pub fn backpressure_enabled(&self) -> bool {
        self.node_error_period > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_or_negative_period_disables_backpressure() {
        assert!(SchedulerSettings::default().backpressure_enabled());
        let disabled = SchedulerSettings {
            node_error_period: 0,
            max_node_errors: 5,
        };
        assert!(!disabled.backpressure_enabled());
        let negative = SchedulerSettings {
            node_error_period: -3,
            max_node_errors: 5,
        };
        assert!(!negative.backpressure_enabled());
    }
}
