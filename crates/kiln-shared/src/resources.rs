//! # Node Resources
//!
//! The resource vector attached to tasks and executions. The wire shape is
//! `{ "cpus": float, "mem_mb": float, "disk_mb": float }`.

use serde::{Deserialize, Serialize};

/// CPU, memory, and disk requested by a task or offered by a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeResources {
    pub cpus: f64,
    pub mem_mb: f64,
    pub disk_mb: f64,
}

impl NodeResources {
    pub const fn new(cpus: f64, mem_mb: f64, disk_mb: f64) -> Self {
        Self {
            cpus,
            mem_mb,
            disk_mb,
        }
    }

    /// Add another resource vector to this one
    pub fn add(&mut self, other: &NodeResources) {
        self.cpus += other.cpus;
        self.mem_mb += other.mem_mb;
        self.disk_mb += other.disk_mb;
    }

    /// True when every dimension fits within `available`
    pub fn fits_within(&self, available: &NodeResources) -> bool {
        self.cpus <= available.cpus
            && self.mem_mb <= available.mem_mb
            && self.disk_mb <= available.disk_mb
    }
}
