//! Job execution rows and the task-outcome payload reported by workers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ErrorCategory;
use crate::resources::NodeResources;

/// Lifecycle status of a job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
    /// The execution's node disappeared while it was running
    Lost,
}

impl ExecutionStatus {
    /// Terminal statuses are immutable: store-level updates against a
    /// terminal execution are no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Canceled | Self::Lost
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Lost => "LOST",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            "LOST" => Ok(Self::Lost),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// One attempt to run a job on a cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: i64,
    pub job_id: i64,
    pub job_type_id: i64,
    pub node_id: i64,
    /// System jobs run without the PRE/POST task wrappers
    pub is_system: bool,
    pub status: ExecutionStatus,
    pub num_attempts: i32,
    pub max_attempts: i32,
    /// Resources requested by the job; every task of the execution is
    /// dispatched with this vector
    pub resources: NodeResources,
    pub queued: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub error_name: Option<String>,
    pub error_category: Option<ErrorCategory>,
}

impl JobExecution {
    /// True once the job has consumed every retry attempt
    pub fn has_exhausted_attempts(&self) -> bool {
        self.num_attempts >= self.max_attempts
    }
}

/// Outcome payload delivered by a worker when a task finishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub task_id: String,
    pub when: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub stdout_url: Option<String>,
    pub stderr_url: Option<String>,
}

impl TaskResults {
    pub fn new(task_id: impl Into<String>, when: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            when,
            exit_code: None,
            stdout_url: None,
            stderr_url: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            ExecutionStatus::Queued,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Canceled,
            ExecutionStatus::Lost,
        ] {
            let parsed: ExecutionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Queued.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Canceled.is_terminal());
        assert!(ExecutionStatus::Lost.is_terminal());
    }

    #[test]
    fn test_attempt_exhaustion() {
        let mut exe = JobExecution {
            id: 1,
            job_id: 10,
            job_type_id: 3,
            node_id: 7,
            is_system: false,
            status: ExecutionStatus::Running,
            num_attempts: 2,
            max_attempts: 3,
            resources: NodeResources::new(1.0, 512.0, 1024.0),
            queued: Utc::now(),
            started: None,
            ended: None,
            error_name: None,
            error_category: None,
        };
        assert!(!exe.has_exhausted_attempts());
        exe.num_attempts = 3;
        assert!(exe.has_exhausted_attempts());
    }
}
