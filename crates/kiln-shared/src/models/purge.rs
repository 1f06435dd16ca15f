//! Per-source-file purge coordination rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent coordination point for one source file's purge cascade.
///
/// Created when a user initiates the purge and updated by every message in
/// the cascade. Once `force_stop_purge` is set, no further destructive
/// action executes for the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeResults {
    pub source_file_id: i64,
    pub trigger_id: i64,
    pub force_stop_purge: bool,
    pub num_recipes_deleted: i32,
    pub purge_completed: Option<DateTime<Utc>>,
}

impl PurgeResults {
    pub fn new(source_file_id: i64, trigger_id: i64) -> Self {
        Self {
            source_file_id,
            trigger_id,
            force_stop_purge: false,
            num_recipes_deleted: 0,
            purge_completed: None,
        }
    }
}
