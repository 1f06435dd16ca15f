//! Injected collaborators of the execution state machine.
//!
//! The queue-side job handlers and the error catalog are interfaces, not
//! concrete dependencies: they are supplied at construction so the state
//! machine never reaches across module boundaries for them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use kiln_shared::models::{ErrorCategory, JobError};
use kiln_shared::store::DataStore;
use kiln_shared::KilnResult;

/// Queue-side handlers invoked when an execution reaches a terminal outcome
#[async_trait]
pub trait QueueSink: Send + Sync {
    async fn handle_job_completion(&self, exe_id: i64, when: DateTime<Utc>) -> KilnResult<()>;

    async fn handle_job_failure(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
        error: &JobError,
    ) -> KilnResult<()>;
}

/// Catalog of the built-in infrastructure errors
pub trait ErrorCatalog: Send + Sync {
    /// The execution's node disappeared while it was running
    fn node_lost(&self) -> JobError;

    /// The execution exceeded its allowed duration
    fn timeout(&self) -> JobError;

    /// Fallback when a task fails without attribution. Deliberately not
    /// SYSTEM: an unattributed failure must not count toward pausing nodes.
    fn unknown(&self) -> JobError;
}

/// Queue sink that finalizes the execution row through the store
#[derive(Debug, Clone)]
pub struct StoreQueueSink {
    store: DataStore,
}

impl StoreQueueSink {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl QueueSink for StoreQueueSink {
    async fn handle_job_completion(&self, exe_id: i64, when: DateTime<Utc>) -> KilnResult<()> {
        self.store.mark_execution_completed(exe_id, when).await?;
        Ok(())
    }

    async fn handle_job_failure(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
        error: &JobError,
    ) -> KilnResult<()> {
        self.store.mark_execution_failed(exe_id, when, error).await?;
        Ok(())
    }
}

/// The built-in error catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorCatalog;

impl ErrorCatalog for StandardErrorCatalog {
    fn node_lost(&self) -> JobError {
        JobError::new(
            "node-lost",
            ErrorCategory::System,
            "The node running the execution was lost",
        )
    }

    fn timeout(&self) -> JobError {
        JobError::new(
            "timeout",
            ErrorCategory::System,
            "The execution exceeded its allowed running time",
        )
    }

    fn unknown(&self) -> JobError {
        JobError::new(
            "unknown",
            ErrorCategory::Algorithm,
            "The task failed for an unknown reason",
        )
    }
}
