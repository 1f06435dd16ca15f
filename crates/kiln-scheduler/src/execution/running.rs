//! The per-execution state machine.
//!
//! A `RunningExecution` owns the ordered task sequence of one job execution
//! and is the only writer of that sequence between construction and the
//! terminal state. Every public method takes the execution's lock for its
//! full duration, including the enclosed store writes, which serializes the
//! scheduler loop, worker callbacks, and the timeout/lost watchers.
//!
//! Stale callbacks are detected by task-id equality and handled as silent
//! no-ops; this absorbs the race between cancellation and in-flight worker
//! messages.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use kiln_shared::models::{JobError, JobExecution, TaskResults};
use kiln_shared::resources::NodeResources;
use kiln_shared::store::DataStore;
use kiln_shared::KilnResult;

use super::backpressure::NodeFailureMonitor;
use super::factory::TaskFactory;
use super::hooks::{ErrorCatalog, QueueSink};
use super::task::ExecutionTask;

#[derive(Debug)]
struct ExecutionState {
    current_task: Option<ExecutionTask>,
    remaining_tasks: VecDeque<ExecutionTask>,
}

/// A currently running job execution. Thread-safe.
pub struct RunningExecution {
    id: i64,
    job_type_id: i64,
    node_id: i64,
    store: DataStore,
    queue: Arc<dyn QueueSink>,
    errors: Arc<dyn ErrorCatalog>,
    monitor: NodeFailureMonitor,
    state: Mutex<ExecutionState>,
}

impl std::fmt::Debug for RunningExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningExecution")
            .field("id", &self.id)
            .field("job_type_id", &self.job_type_id)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl RunningExecution {
    /// Build the state machine for `exe`, which must be in RUNNING status.
    /// The task queue starts non-empty and no task is current.
    pub fn new(
        exe: &JobExecution,
        factory: &TaskFactory,
        store: DataStore,
        queue: Arc<dyn QueueSink>,
        errors: Arc<dyn ErrorCatalog>,
    ) -> Self {
        let remaining_tasks: VecDeque<ExecutionTask> = factory.tasks_for(exe).into();

        Self {
            id: exe.id,
            job_type_id: exe.job_type_id,
            node_id: exe.node_id,
            monitor: NodeFailureMonitor::new(store.clone()),
            store,
            queue,
            errors,
            state: Mutex::new(ExecutionState {
                current_task: None,
                remaining_tasks,
            }),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn job_type_id(&self) -> i64 {
        self.job_type_id
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    /// The currently running task, if any
    pub async fn current_task(&self) -> Option<ExecutionTask> {
        self.state.lock().await.current_task.clone()
    }

    /// True iff no task is current and tasks remain to be started
    pub async fn is_next_task_ready(&self) -> bool {
        let state = self.state.lock().await;
        state.current_task.is_none() && !state.remaining_tasks.is_empty()
    }

    /// True iff no task is current and no tasks remain
    pub async fn is_finished(&self) -> bool {
        let state = self.state.lock().await;
        state.current_task.is_none() && state.remaining_tasks.is_empty()
    }

    /// Resources required by the next task, or None when nothing remains
    pub async fn next_task_resources(&self) -> Option<NodeResources> {
        let state = self.state.lock().await;
        state.remaining_tasks.front().map(|t| t.resources())
    }

    /// Atomically promote the head of the queue to the current task and
    /// return it. No-op returning None when a task is already current or
    /// nothing remains.
    pub async fn start_next_task(&self) -> Option<ExecutionTask> {
        let mut state = self.state.lock().await;
        if state.current_task.is_some() || state.remaining_tasks.is_empty() {
            return None;
        }

        let task = state.remaining_tasks.pop_front();
        state.current_task = task.clone();
        task
    }

    /// Record start metadata reported by the worker. Silently ignored when
    /// `task_id` is not the current task.
    pub async fn task_running(
        &self,
        task_id: &str,
        when: DateTime<Utc>,
        stdout_url: &str,
        stderr_url: &str,
    ) -> KilnResult<()> {
        let mut state = self.state.lock().await;
        let Some(task) = state.current_task.as_mut() else {
            return Ok(());
        };
        if task.id() != task_id {
            debug!(
                exe_id = self.id,
                task_id = task_id,
                current_task = task.id(),
                "stale task_running callback ignored"
            );
            return Ok(());
        }

        task.running(&self.store, when, stdout_url, stderr_url)
            .await?;
        Ok(())
    }

    /// Commit the current task's completion. When the queue is empty the
    /// queue-side job completion handler fires with the results' timestamp.
    /// Silently ignored on task-id mismatch.
    pub async fn task_complete(&self, results: &TaskResults) -> KilnResult<()> {
        let mut state = self.state.lock().await;
        let task = match state.current_task.as_ref() {
            Some(task) if task.id() == results.task_id => task,
            _ => {
                debug!(
                    exe_id = self.id,
                    task_id = %results.task_id,
                    "stale task_complete callback ignored"
                );
                return Ok(());
            }
        };

        task.complete(&self.store, results).await?;
        if state.remaining_tasks.is_empty() {
            self.queue.handle_job_completion(self.id, results.when).await?;
        }

        state.current_task = None;
        Ok(())
    }

    /// Commit the current task's failure, resolve the error (unknown when
    /// none is supplied), record the job failure, and run the node
    /// error-rate check. Clears the task queue: no further task will start
    /// for this execution. Silently ignored on task-id mismatch.
    pub async fn task_fail(
        &self,
        results: &TaskResults,
        error: Option<JobError>,
    ) -> KilnResult<()> {
        let mut state = self.state.lock().await;
        match state.current_task.as_ref() {
            Some(task) if task.id() == results.task_id => {}
            _ => {
                debug!(
                    exe_id = self.id,
                    task_id = %results.task_id,
                    "stale task_fail callback ignored"
                );
                return Ok(());
            }
        }

        let error = error.unwrap_or_else(|| self.errors.unknown());
        if let Some(task) = state.current_task.as_ref() {
            task.fail(&self.store, results, &error).await?;
        }
        self.queue
            .handle_job_failure(self.id, results.when, &error)
            .await?;

        // Re-read the execution so the monitor sees the failure just recorded
        let exe = self.store.job_execution(self.id).await?;
        self.monitor.evaluate(&exe, &error).await?;

        state.current_task = None;
        state.remaining_tasks.clear();
        Ok(())
    }

    /// Cancel the execution: clear all state and return the then-current
    /// task so the caller can kill it on the worker. Any subsequent task
    /// callback is ignored.
    pub async fn execution_canceled(&self) -> Option<ExecutionTask> {
        let mut state = self.state.lock().await;
        let task = state.current_task.take();
        state.remaining_tasks.clear();
        task
    }

    /// Fail the execution because its node was lost; returns the
    /// then-current task
    pub async fn execution_lost(&self, when: DateTime<Utc>) -> KilnResult<Option<ExecutionTask>> {
        let mut state = self.state.lock().await;
        let error = self.errors.node_lost();
        self.queue.handle_job_failure(self.id, when, &error).await?;

        let task = state.current_task.take();
        state.remaining_tasks.clear();
        Ok(task)
    }

    /// Fail the execution because it timed out; returns the then-current
    /// task
    pub async fn execution_timed_out(
        &self,
        when: DateTime<Utc>,
    ) -> KilnResult<Option<ExecutionTask>> {
        let mut state = self.state.lock().await;
        let error = self.errors.timeout();
        self.queue.handle_job_failure(self.id, when, &error).await?;

        let task = state.current_task.take();
        state.remaining_tasks.clear();
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    use kiln_shared::models::{ErrorCategory, ExecutionStatus, SchedulerSettings};
    use kiln_shared::store::InMemoryDataStore;

    use crate::execution::hooks::{StandardErrorCatalog, StoreQueueSink};
    use crate::execution::NODE_PAUSE_REASON;

    /// Queue sink that records every call for assertions
    #[derive(Debug, Default)]
    struct RecordingQueueSink {
        completions: StdMutex<Vec<(i64, DateTime<Utc>)>>,
        failures: StdMutex<Vec<(i64, DateTime<Utc>, JobError)>>,
    }

    impl RecordingQueueSink {
        fn completions(&self) -> Vec<(i64, DateTime<Utc>)> {
            self.completions.lock().unwrap().clone()
        }

        fn failures(&self) -> Vec<(i64, DateTime<Utc>, JobError)> {
            self.failures.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QueueSink for RecordingQueueSink {
        async fn handle_job_completion(&self, exe_id: i64, when: DateTime<Utc>) -> KilnResult<()> {
            self.completions.lock().unwrap().push((exe_id, when));
            Ok(())
        }

        async fn handle_job_failure(
            &self,
            exe_id: i64,
            when: DateTime<Utc>,
            error: &JobError,
        ) -> KilnResult<()> {
            self.failures
                .lock()
                .unwrap()
                .push((exe_id, when, error.clone()));
            Ok(())
        }
    }

    fn execution(id: i64, is_system: bool) -> JobExecution {
        JobExecution {
            id,
            job_id: 10,
            job_type_id: 3,
            node_id: 7,
            is_system,
            status: ExecutionStatus::Running,
            num_attempts: 1,
            max_attempts: 3,
            resources: NodeResources::new(1.0, 512.0, 1024.0),
            queued: Utc::now(),
            started: Some(Utc::now()),
            ended: None,
            error_name: None,
            error_category: None,
        }
    }

    struct Harness {
        mem: InMemoryDataStore,
        sink: Arc<RecordingQueueSink>,
        running: RunningExecution,
    }

    fn harness(exe: JobExecution) -> Harness {
        let mem = InMemoryDataStore::new();
        mem.add_cluster_node("worker-01");
        mem.insert_job_execution(exe.clone());

        let sink = Arc::new(RecordingQueueSink::default());
        let running = RunningExecution::new(
            &exe,
            &TaskFactory::new(),
            DataStore::InMemory(mem.clone()),
            sink.clone(),
            Arc::new(StandardErrorCatalog),
        );
        Harness { mem, sink, running }
    }

    async fn drive_task_to_running(harness: &Harness) -> ExecutionTask {
        let task = harness.running.start_next_task().await.unwrap();
        harness
            .running
            .task_running(
                task.id(),
                Utc::now(),
                "http://logs/stdout",
                "http://logs/stderr",
            )
            .await
            .unwrap();
        task
    }

    #[tokio::test]
    async fn test_happy_path_runs_pre_main_post() {
        let h = harness(execution(42, false));

        let mut seen = Vec::new();
        let mut final_when = None;
        for _ in 0..3 {
            assert!(h.running.is_next_task_ready().await);
            let task = drive_task_to_running(&h).await;
            seen.push(task.id().to_string());

            // Exactly one task is current at any observation point
            assert!(!h.running.is_next_task_ready().await);
            assert!(h.running.start_next_task().await.is_none());

            let when = Utc::now();
            final_when = Some(when);
            let results = TaskResults::new(task.id(), when).with_exit_code(0);
            h.running.task_complete(&results).await.unwrap();
        }

        assert_eq!(seen, vec!["pre_42", "main_42", "post_42"]);
        assert!(h.running.is_finished().await);
        assert!(h.running.start_next_task().await.is_none());

        // Job completion fired exactly once, with the POST task's timestamp
        assert_eq!(h.sink.completions(), vec![(42, final_when.unwrap())]);
        assert!(h.sink.failures().is_empty());
    }

    #[tokio::test]
    async fn test_system_execution_runs_main_only() {
        let h = harness(execution(9, true));

        let task = h.running.start_next_task().await.unwrap();
        assert_eq!(task.id(), "main_9");

        let results = TaskResults::new(task.id(), Utc::now());
        h.running.task_complete(&results).await.unwrap();

        assert!(h.running.is_finished().await);
        assert_eq!(h.sink.completions().len(), 1);
    }

    #[tokio::test]
    async fn test_next_task_resources() {
        let h = harness(execution(1, false));
        assert_eq!(
            h.running.next_task_resources().await,
            Some(NodeResources::new(1.0, 512.0, 1024.0))
        );

        // Drain every task; no resources remain
        for _ in 0..3 {
            let task = h.running.start_next_task().await.unwrap();
            let results = TaskResults::new(task.id(), Utc::now());
            h.running.task_complete(&results).await.unwrap();
        }
        assert_eq!(h.running.next_task_resources().await, None);
    }

    #[tokio::test]
    async fn test_task_running_records_log_urls() {
        let h = harness(execution(5, false));
        let task = drive_task_to_running(&h).await;

        let record = h.mem.task_record(task.id()).unwrap();
        assert!(record.started.is_some());
        assert_eq!(record.stdout_url.as_deref(), Some("http://logs/stdout"));
        assert_eq!(record.stderr_url.as_deref(), Some("http://logs/stderr"));

        let current = h.running.current_task().await.unwrap();
        assert_eq!(current.stdout_url(), Some("http://logs/stdout"));
    }

    #[tokio::test]
    async fn test_mismatched_callbacks_are_no_ops() {
        let h = harness(execution(5, false));
        let task = h.running.start_next_task().await.unwrap();

        // Wrong task id: no state change, no store writes
        h.running
            .task_running("main_5", Utc::now(), "http://x", "http://y")
            .await
            .unwrap();
        assert!(h.mem.task_record("main_5").is_none());
        assert!(h.mem.task_record(task.id()).is_none());

        let stale = TaskResults::new("main_5", Utc::now());
        h.running.task_complete(&stale).await.unwrap();
        h.running.task_fail(&stale, None).await.unwrap();

        // The pre task is still current and the queue was not cleared
        let current = h.running.current_task().await.unwrap();
        assert_eq!(current.id(), task.id());
        assert!(!h.running.is_finished().await);
        assert!(h.sink.completions().is_empty());
        assert!(h.sink.failures().is_empty());
    }

    #[tokio::test]
    async fn test_stale_callback_after_cancel() {
        let h = harness(execution(5, false));
        let task = drive_task_to_running(&h).await;
        let record_before = h.mem.task_record(task.id());

        let canceled = h.running.execution_canceled().await.unwrap();
        assert_eq!(canceled.id(), task.id());

        // In-flight completion for the previously-current task: ignored
        let results = TaskResults::new(task.id(), Utc::now()).with_exit_code(0);
        h.running.task_complete(&results).await.unwrap();

        assert_eq!(h.mem.task_record(task.id()), record_before);
        assert!(h.sink.completions().is_empty());
        assert!(h.running.is_finished().await);
    }

    #[tokio::test]
    async fn test_task_fail_resolves_unknown_error_and_halts() {
        let h = harness(execution(5, false));
        let task = h.running.start_next_task().await.unwrap();

        let when = Utc::now();
        let results = TaskResults::new(task.id(), when).with_exit_code(1);
        h.running.task_fail(&results, None).await.unwrap();

        let failures = h.sink.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].2.name, "unknown");

        // Failure is terminal for the execution instance
        assert!(h.running.is_finished().await);
        assert!(h.running.start_next_task().await.is_none());

        let record = h.mem.task_record(task.id()).unwrap();
        assert_eq!(record.error_name.as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn test_task_fail_uses_supplied_error() {
        let h = harness(execution(5, false));
        let task = h.running.start_next_task().await.unwrap();

        let error = JobError::new("bad-geometry", ErrorCategory::Data, "unparseable footprint");
        let results = TaskResults::new(task.id(), Utc::now()).with_exit_code(2);
        h.running.task_fail(&results, Some(error.clone())).await.unwrap();

        assert_eq!(h.sink.failures()[0].2, error);
    }

    #[tokio::test]
    async fn test_execution_canceled_returns_current_task() {
        let h = harness(execution(5, false));
        let task = h.running.start_next_task().await.unwrap();

        let returned = h.running.execution_canceled().await;
        assert_eq!(returned.unwrap().id(), task.id());
        assert!(h.running.is_finished().await);

        // Cancel with no current task returns None
        assert!(h.running.execution_canceled().await.is_none());
    }

    #[tokio::test]
    async fn test_execution_lost_records_node_lost_failure() {
        let h = harness(execution(5, false));
        let task = h.running.start_next_task().await.unwrap();

        let when = Utc::now();
        let returned = h.running.execution_lost(when).await.unwrap();
        assert_eq!(returned.unwrap().id(), task.id());

        let failures = h.sink.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, when);
        assert_eq!(failures[0].2.name, "node-lost");
        assert!(failures[0].2.is_system());
        assert!(h.running.is_finished().await);
    }

    #[tokio::test]
    async fn test_execution_timed_out_records_timeout_failure() {
        let h = harness(execution(5, false));
        h.running.start_next_task().await.unwrap();

        let when = Utc::now();
        h.running.execution_timed_out(when).await.unwrap();

        let failures = h.sink.failures();
        assert_eq!(failures[0].2.name, "timeout");
        assert!(h.running.is_finished().await);
    }

    /// Five distinct jobs failing with SYSTEM errors on one node within the
    /// window pause the node on the fifth failure.
    #[tokio::test]
    async fn test_task_fail_pauses_node_after_repeated_system_failures() {
        let mem = InMemoryDataStore::new();
        let node_id = mem.add_cluster_node("worker-09");
        mem.set_scheduler_settings(SchedulerSettings {
            node_error_period: 1,
            max_node_errors: 5,
        });

        let store = DataStore::InMemory(mem.clone());
        let sink = Arc::new(StoreQueueSink::new(store.clone()));
        let error = JobError::new("docker-fault", ErrorCategory::System, "daemon unreachable");

        for i in 0..5 {
            let mut exe = execution(100 + i, true);
            exe.job_id = 200 + i;
            exe.node_id = node_id;
            exe.num_attempts = 3;
            exe.max_attempts = 3;
            mem.insert_job_execution(exe.clone());

            let running = RunningExecution::new(
                &exe,
                &TaskFactory::new(),
                store.clone(),
                sink.clone(),
                Arc::new(StandardErrorCatalog),
            );
            let task = running.start_next_task().await.unwrap();
            let results = TaskResults::new(task.id(), Utc::now()).with_exit_code(1);
            running.task_fail(&results, Some(error.clone())).await.unwrap();

            let node = store.node(node_id).await.unwrap().unwrap();
            if i < 4 {
                assert!(!node.is_paused, "node paused after only {} failures", i + 1);
            } else {
                assert!(node.is_paused);
                assert_eq!(node.pause_reason.as_deref(), Some(NODE_PAUSE_REASON));
            }
        }
    }
}
