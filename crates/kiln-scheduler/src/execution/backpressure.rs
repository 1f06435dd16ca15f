//! Node back-pressure: pause a node whose SYSTEM-error rate is too high.

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use kiln_shared::models::{JobError, JobExecution};
use kiln_shared::store::DataStore;
use kiln_shared::KilnResult;

/// Pause reason recorded on nodes tripped by the error-rate check
pub const NODE_PAUSE_REASON: &str = "System Failure Rate Too High";

/// Watches for clusters of SYSTEM failures on a single node.
///
/// Evaluated after a failure has been recorded, so the count includes the
/// failure that triggered the evaluation. The scheduler settings row is read
/// once per evaluation; both thresholds come from that single read.
#[derive(Debug, Clone)]
pub struct NodeFailureMonitor {
    store: DataStore,
}

impl NodeFailureMonitor {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    /// Decide whether `exe`'s node should be paused after failing with
    /// `error`.
    ///
    /// Applies only when the error is SYSTEM, the job has consumed all
    /// retry attempts, and the node is not already paused. A
    /// `node_error_period` of zero or less disables the check entirely.
    pub async fn evaluate(&self, exe: &JobExecution, error: &JobError) -> KilnResult<()> {
        if !error.is_system() || !exe.has_exhausted_attempts() {
            return Ok(());
        }

        let Some(node) = self.store.node(exe.node_id).await? else {
            return Ok(());
        };
        if node.is_paused {
            return Ok(());
        }

        let settings = self.store.scheduler_settings().await?;
        if !settings.backpressure_enabled() {
            debug!(
                node_id = node.id,
                "node error-rate check disabled, skipping"
            );
            return Ok(());
        }

        let since = Utc::now() - Duration::minutes(settings.node_error_period as i64);
        let num_node_errors = self.store.count_node_system_failures(node.id, since).await?;

        if num_node_errors >= settings.max_node_errors as i64 {
            warn!(
                hostname = %node.hostname,
                num_node_errors = num_node_errors,
                node_error_period = settings.node_error_period,
                "node failed too many jobs with system errors, pausing the host"
            );
            self.store.pause_node(node.id, NODE_PAUSE_REASON).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_shared::models::{ErrorCategory, ExecutionStatus, SchedulerSettings};
    use kiln_shared::resources::NodeResources;
    use kiln_shared::store::InMemoryDataStore;

    fn execution(id: i64, job_id: i64, node_id: i64, attempts: (i32, i32)) -> JobExecution {
        JobExecution {
            id,
            job_id,
            job_type_id: 1,
            node_id,
            is_system: false,
            status: ExecutionStatus::Running,
            num_attempts: attempts.0,
            max_attempts: attempts.1,
            resources: NodeResources::new(1.0, 256.0, 512.0),
            queued: Utc::now(),
            started: Some(Utc::now()),
            ended: None,
            error_name: None,
            error_category: None,
        }
    }

    fn system_error() -> JobError {
        JobError::new("cluster-fault", ErrorCategory::System, "agent crashed")
    }

    /// Record `count` distinct-job SYSTEM failures on `node_id`
    fn record_failures(mem: &InMemoryDataStore, node_id: i64, count: i64) {
        for i in 0..count {
            let exe_id = 100 + i;
            mem.insert_job_execution(execution(exe_id, 200 + i, node_id, (3, 3)));
            mem.mark_execution_failed(exe_id, Utc::now(), &system_error())
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_pauses_node_at_threshold() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-03");
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 1,
            max_node_errors: 5,
        });
        record_failures(&mem, node_id, 5);

        let store = DataStore::InMemory(mem.clone());
        let monitor = NodeFailureMonitor::new(store.clone());
        let exe = execution(100, 200, node_id, (3, 3));
        monitor.evaluate(&exe, &system_error()).await.unwrap();

        let node = store.node(node_id).await.unwrap().unwrap();
        assert!(node.is_paused);
        assert!(node.is_paused_errors);
        assert_eq!(node.pause_reason.as_deref(), Some(NODE_PAUSE_REASON));
    }

    #[tokio::test]
    async fn test_below_threshold_leaves_node_alone() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-03");
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 1,
            max_node_errors: 5,
        });
        record_failures(&mem, node_id, 4);

        let store = DataStore::InMemory(mem);
        let monitor = NodeFailureMonitor::new(store.clone());
        let exe = execution(100, 200, node_id, (3, 3));
        monitor.evaluate(&exe, &system_error()).await.unwrap();

        assert!(!store.node(node_id).await.unwrap().unwrap().is_paused);
    }

    #[tokio::test]
    async fn test_zero_period_disables_check() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-03");
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 0,
            max_node_errors: 1,
        });
        record_failures(&mem, node_id, 10);

        let store = DataStore::InMemory(mem);
        let monitor = NodeFailureMonitor::new(store.clone());
        let exe = execution(100, 200, node_id, (3, 3));
        monitor.evaluate(&exe, &system_error()).await.unwrap();

        assert!(!store.node(node_id).await.unwrap().unwrap().is_paused);
    }

    #[tokio::test]
    async fn test_retries_remaining_skip_check() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-03");
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 1,
            max_node_errors: 1,
        });
        record_failures(&mem, node_id, 5);

        let store = DataStore::InMemory(mem);
        let monitor = NodeFailureMonitor::new(store.clone());
        // Attempt 1 of 3: the job will retry, so the node is spared
        let exe = execution(100, 200, node_id, (1, 3));
        monitor.evaluate(&exe, &system_error()).await.unwrap();

        assert!(!store.node(node_id).await.unwrap().unwrap().is_paused);
    }

    #[tokio::test]
    async fn test_non_system_error_never_counts() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-03");
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 1,
            max_node_errors: 1,
        });
        record_failures(&mem, node_id, 5);

        let store = DataStore::InMemory(mem);
        let monitor = NodeFailureMonitor::new(store.clone());
        let exe = execution(100, 200, node_id, (3, 3));
        let error = JobError::new("bad-data", ErrorCategory::Data, "corrupt input");
        monitor.evaluate(&exe, &error).await.unwrap();

        assert!(!store.node(node_id).await.unwrap().unwrap().is_paused);
    }

    #[tokio::test]
    async fn test_already_paused_node_is_untouched() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-03");
        mem.pause_node(node_id, "maintenance").unwrap();
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 1,
            max_node_errors: 1,
        });
        record_failures(&mem, node_id, 5);

        let store = DataStore::InMemory(mem);
        let monitor = NodeFailureMonitor::new(store.clone());
        let exe = execution(100, 200, node_id, (3, 3));
        monitor.evaluate(&exe, &system_error()).await.unwrap();

        let node = store.node(node_id).await.unwrap().unwrap();
        assert_eq!(node.pause_reason.as_deref(), Some("maintenance"));
    }
}
