//! Job rows. Only the slice of the job model the scheduler core needs:
//! purge queries and retry bookkeeping live on the execution row.

use serde::{Deserialize, Serialize};

use super::execution::ExecutionStatus;

/// A job definition instance; executions are attempts to run it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_type_id: i64,
    pub status: ExecutionStatus,
}

impl Job {
    pub fn new(id: i64, job_type_id: i64, status: ExecutionStatus) -> Self {
        Self {
            id,
            job_type_id,
            status,
        }
    }
}
