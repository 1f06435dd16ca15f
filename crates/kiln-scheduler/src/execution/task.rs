//! Task descriptors: the immutable units dispatched to worker nodes.

use std::fmt;

use chrono::{DateTime, Utc};

use kiln_shared::models::{JobError, JobExecution, TaskResults};
use kiln_shared::resources::NodeResources;
use kiln_shared::store::{DataStore, StoreError};

/// Position of a task in its execution's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Input staging; elided for system jobs
    Pre,
    /// The job's own containerized work
    Main,
    /// Output storage; elided for system jobs
    Post,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pre => "pre",
            Self::Main => "main",
            Self::Post => "post",
        };
        write!(f, "{s}")
    }
}

/// One task of a running execution.
///
/// Deterministic for a given execution snapshot: the id is derived from the
/// task kind and execution id, and the resource vector is the execution's.
/// Lifecycle writes go through the store; in-memory start metadata is kept
/// so the state machine can report the current task to callers.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    id: String,
    kind: TaskKind,
    exe_id: i64,
    resources: NodeResources,
    started: Option<DateTime<Utc>>,
    stdout_url: Option<String>,
    stderr_url: Option<String>,
}

impl ExecutionTask {
    pub(crate) fn new(kind: TaskKind, exe: &JobExecution) -> Self {
        Self {
            id: format!("{kind}_{}", exe.id),
            kind,
            exe_id: exe.id,
            resources: exe.resources,
            started: None,
            stdout_url: None,
            stderr_url: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn exe_id(&self) -> i64 {
        self.exe_id
    }

    pub fn resources(&self) -> NodeResources {
        self.resources
    }

    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.started
    }

    pub fn stdout_url(&self) -> Option<&str> {
        self.stdout_url.as_deref()
    }

    pub fn stderr_url(&self) -> Option<&str> {
        self.stderr_url.as_deref()
    }

    /// Record that the worker reported this task running
    pub(crate) async fn running(
        &mut self,
        store: &DataStore,
        when: DateTime<Utc>,
        stdout_url: &str,
        stderr_url: &str,
    ) -> Result<(), StoreError> {
        self.started = Some(when);
        self.stdout_url = Some(stdout_url.to_string());
        self.stderr_url = Some(stderr_url.to_string());
        store
            .record_task_started(self.exe_id, &self.id, when, stdout_url, stderr_url)
            .await
    }

    /// Commit this task's completion
    pub(crate) async fn complete(
        &self,
        store: &DataStore,
        results: &TaskResults,
    ) -> Result<(), StoreError> {
        store.complete_task(self.exe_id, &self.id, results).await
    }

    /// Commit this task's failure with the resolved error
    pub(crate) async fn fail(
        &self,
        store: &DataStore,
        results: &TaskResults,
        error: &JobError,
    ) -> Result<(), StoreError> {
        store.fail_task(self.exe_id, &self.id, results, error).await
    }
}
