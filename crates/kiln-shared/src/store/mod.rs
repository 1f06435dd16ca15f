//! # Data Store
//!
//! The authoritative persistent store behind the scheduler core. Providers
//! are an enum with enum dispatch: `Postgres` issues sqlx queries against
//! the relational schema, `InMemory` backs tests and local development with
//! identical semantics (including terminal-state immutability and
//! idempotent deletes).
//!
//! Every mutation is transactional per call on the Postgres side. Purge
//! messages derive their follow-on work exclusively from these reads, which
//! is what makes re-delivery safe.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryDataStore;
pub use postgres::PgDataStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    Job, JobError, JobExecution, Node, PurgeResults, Recipe, RecipeNode, SchedulerSettings,
    SourceFile, TaskResults,
};

/// Errors raised by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_value(reason: impl Into<String>) -> Self {
        Self::InvalidValue(reason.into())
    }
}

/// Final outcome recorded for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskOutcome {
    Completed,
    Failed,
}

/// Persisted per-task lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub exe_id: i64,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub stdout_url: Option<String>,
    pub stderr_url: Option<String>,
    pub outcome: Option<TaskOutcome>,
    pub error_name: Option<String>,
}

impl TaskRecord {
    fn new(task_id: impl Into<String>, exe_id: i64) -> Self {
        Self {
            task_id: task_id.into(),
            exe_id,
            started: None,
            ended: None,
            exit_code: None,
            stdout_url: None,
            stderr_url: None,
            outcome: None,
            error_name: None,
        }
    }
}

/// A request to spawn a system delete-files job for one job's products
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFilesJobRequest {
    pub job_id: i64,
    pub trigger_id: i64,
    pub source_file_id: i64,
    pub purge: bool,
}

/// The authoritative store, dispatched by provider
#[derive(Debug, Clone)]
pub enum DataStore {
    Postgres(PgDataStore),
    InMemory(InMemoryDataStore),
}

impl DataStore {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryDataStore::new())
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::InMemory(_) => "in_memory",
        }
    }

    // =========================================================================
    // Purge graph reads
    // =========================================================================

    /// The purge coordination row for a source file. Missing rows are an
    /// error: the row is created when the purge is initiated.
    pub async fn purge_results(&self, source_file_id: i64) -> Result<PurgeResults, StoreError> {
        match self {
            Self::Postgres(s) => s.purge_results(source_file_id).await,
            Self::InMemory(s) => s.purge_results(source_file_id),
        }
    }

    pub async fn source_file(&self, id: i64) -> Result<Option<SourceFile>, StoreError> {
        match self {
            Self::Postgres(s) => s.source_file(id).await,
            Self::InMemory(s) => s.source_file(id),
        }
    }

    pub async fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        match self {
            Self::Postgres(s) => s.recipe(id).await,
            Self::InMemory(s) => s.recipe(id),
        }
    }

    pub async fn recipe_nodes(&self, recipe_id: i64) -> Result<Vec<RecipeNode>, StoreError> {
        match self {
            Self::Postgres(s) => s.recipe_nodes(recipe_id).await,
            Self::InMemory(s) => s.recipe_nodes(recipe_id),
        }
    }

    /// Jobs referenced by this recipe's nodes that no other node depends on,
    /// restricted to jobs that still exist
    pub async fn leaf_jobs(&self, recipe_id: i64) -> Result<Vec<i64>, StoreError> {
        match self {
            Self::Postgres(s) => s.leaf_jobs(recipe_id).await,
            Self::InMemory(s) => s.leaf_jobs(recipe_id),
        }
    }

    /// Recipes holding a node whose child is this recipe
    pub async fn parent_recipes(&self, recipe_id: i64) -> Result<Vec<i64>, StoreError> {
        match self {
            Self::Postgres(s) => s.parent_recipes(recipe_id).await,
            Self::InMemory(s) => s.parent_recipes(recipe_id),
        }
    }

    /// Jobs that consume the file and are not placed in any recipe
    pub async fn jobs_consuming_source_file(
        &self,
        source_file_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        match self {
            Self::Postgres(s) => s.jobs_consuming_source_file(source_file_id).await,
            Self::InMemory(s) => s.jobs_consuming_source_file(source_file_id),
        }
    }

    /// Non-superseded recipes that consume the file
    pub async fn recipes_consuming_source_file(
        &self,
        source_file_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        match self {
            Self::Postgres(s) => s.recipes_consuming_source_file(source_file_id).await,
            Self::InMemory(s) => s.recipes_consuming_source_file(source_file_id),
        }
    }

    pub async fn job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        match self {
            Self::Postgres(s) => s.job(id).await,
            Self::InMemory(s) => s.job(id),
        }
    }

    // =========================================================================
    // Purge mutations
    // =========================================================================

    /// Delete the recipe's node rows and then the recipe row. Returns true
    /// only when a recipe row was actually deleted, so callers can increment
    /// the purge counter exactly once.
    pub async fn delete_recipe(&self, recipe_id: i64) -> Result<bool, StoreError> {
        match self {
            Self::Postgres(s) => s.delete_recipe(recipe_id).await,
            Self::InMemory(s) => s.delete_recipe(recipe_id),
        }
    }

    pub async fn increment_recipes_deleted(&self, source_file_id: i64) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.increment_recipes_deleted(source_file_id).await,
            Self::InMemory(s) => s.increment_recipes_deleted(source_file_id),
        }
    }

    /// Delete the ingest rows referencing the file, then the file row;
    /// idempotent
    pub async fn delete_source_file(&self, source_file_id: i64) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.delete_source_file(source_file_id).await,
            Self::InMemory(s) => s.delete_source_file(source_file_id),
        }
    }

    pub async fn set_purge_completed(
        &self,
        source_file_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.set_purge_completed(source_file_id, when).await,
            Self::InMemory(s) => s.set_purge_completed(source_file_id, when),
        }
    }

    pub async fn enqueue_delete_files_job(
        &self,
        request: &DeleteFilesJobRequest,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.enqueue_delete_files_job(request).await,
            Self::InMemory(s) => s.enqueue_delete_files_job(request),
        }
    }

    // =========================================================================
    // Execution lifecycle
    // =========================================================================

    pub async fn job_execution(&self, id: i64) -> Result<JobExecution, StoreError> {
        match self {
            Self::Postgres(s) => s.job_execution(id).await,
            Self::InMemory(s) => s.job_execution(id),
        }
    }

    pub async fn record_task_started(
        &self,
        exe_id: i64,
        task_id: &str,
        when: DateTime<Utc>,
        stdout_url: &str,
        stderr_url: &str,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => {
                s.record_task_started(exe_id, task_id, when, stdout_url, stderr_url)
                    .await
            }
            Self::InMemory(s) => {
                s.record_task_started(exe_id, task_id, when, stdout_url, stderr_url)
            }
        }
    }

    pub async fn complete_task(
        &self,
        exe_id: i64,
        task_id: &str,
        results: &TaskResults,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.complete_task(exe_id, task_id, results).await,
            Self::InMemory(s) => s.complete_task(exe_id, task_id, results),
        }
    }

    pub async fn fail_task(
        &self,
        exe_id: i64,
        task_id: &str,
        results: &TaskResults,
        error: &JobError,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.fail_task(exe_id, task_id, results, error).await,
            Self::InMemory(s) => s.fail_task(exe_id, task_id, results, error),
        }
    }

    /// Finalize a successful execution; no-op once the row is terminal
    pub async fn mark_execution_completed(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.mark_execution_completed(exe_id, when).await,
            Self::InMemory(s) => s.mark_execution_completed(exe_id, when),
        }
    }

    /// Finalize a failed execution with its error; no-op once terminal
    pub async fn mark_execution_failed(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
        error: &JobError,
    ) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.mark_execution_failed(exe_id, when, error).await,
            Self::InMemory(s) => s.mark_execution_failed(exe_id, when, error),
        }
    }

    // =========================================================================
    // Node back-pressure
    // =========================================================================

    pub async fn node(&self, id: i64) -> Result<Option<Node>, StoreError> {
        match self {
            Self::Postgres(s) => s.node(id).await,
            Self::InMemory(s) => s.node(id),
        }
    }

    pub async fn pause_node(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        match self {
            Self::Postgres(s) => s.pause_node(id, reason).await,
            Self::InMemory(s) => s.pause_node(id, reason),
        }
    }

    /// Distinct jobs that failed on the node with a SYSTEM error since
    /// `since`
    pub async fn count_node_system_failures(
        &self,
        node_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        match self {
            Self::Postgres(s) => s.count_node_system_failures(node_id, since).await,
            Self::InMemory(s) => s.count_node_system_failures(node_id, since),
        }
    }

    /// The singleton scheduler settings row
    pub async fn scheduler_settings(&self) -> Result<SchedulerSettings, StoreError> {
        match self {
            Self::Postgres(s) => s.scheduler_settings().await,
            Self::InMemory(s) => s.scheduler_settings(),
        }
    }
}
