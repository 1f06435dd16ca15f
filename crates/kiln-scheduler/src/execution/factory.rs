//! Task factory: builds the ordered task list for an execution.

use kiln_shared::models::JobExecution;

use super::task::{ExecutionTask, TaskKind};

/// Builds the task sequence for an execution: PRE, MAIN, POST for regular
/// jobs; MAIN alone for system jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFactory;

impl TaskFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create_pre_task(&self, exe: &JobExecution) -> ExecutionTask {
        ExecutionTask::new(TaskKind::Pre, exe)
    }

    pub fn create_main_task(&self, exe: &JobExecution) -> ExecutionTask {
        ExecutionTask::new(TaskKind::Main, exe)
    }

    pub fn create_post_task(&self, exe: &JobExecution) -> ExecutionTask {
        ExecutionTask::new(TaskKind::Post, exe)
    }

    /// The ordered task list for the execution
    pub fn tasks_for(&self, exe: &JobExecution) -> Vec<ExecutionTask> {
        let mut tasks = Vec::with_capacity(3);
        if !exe.is_system {
            tasks.push(self.create_pre_task(exe));
        }
        tasks.push(self.create_main_task(exe));
        if !exe.is_system {
            tasks.push(self.create_post_task(exe));
        }
        tasks
    }
}
