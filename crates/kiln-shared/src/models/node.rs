//! Cluster worker node rows.

use serde::{Deserialize, Serialize};

/// A worker node in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub hostname: String,
    /// Paused nodes receive no new tasks
    pub is_paused: bool,
    /// Set when the pause was applied by the error-rate monitor
    pub is_paused_errors: bool,
    pub pause_reason: Option<String>,
}

impl Node {
    pub fn new(id: i64, hostname: impl Into<String>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            is_paused: false,
            is_paused_errors: false,
            pause_reason: None,
        }
    }
}
