//! In-memory store provider.
//!
//! Mirrors the Postgres provider's semantics without a database. Beyond the
//! operational surface it exposes seed helpers for building test graphs
//! (source files, jobs, recipes, nodes, executions) and read accessors for
//! asserting on rows that have no operational getter.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{DeleteFilesJobRequest, StoreError, TaskOutcome, TaskRecord};
use crate::models::{
    ExecutionStatus, Ingest, Job, JobError, JobExecution, Node, PurgeResults, Recipe, RecipeNode,
    RecipeNodeLink, SchedulerSettings, SourceFile, TaskResults,
};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    source_files: HashMap<i64, SourceFile>,
    ingests: HashMap<i64, Ingest>,
    jobs: HashMap<i64, Job>,
    /// (job_id, source_file_id)
    job_input_files: Vec<(i64, i64)>,
    recipes: HashMap<i64, Recipe>,
    /// (recipe_id, source_file_id)
    recipe_input_files: Vec<(i64, i64)>,
    recipe_nodes: Vec<RecipeNode>,
    recipe_node_links: Vec<RecipeNodeLink>,
    purge_results: HashMap<i64, PurgeResults>,
    executions: HashMap<i64, JobExecution>,
    tasks: HashMap<String, TaskRecord>,
    nodes: HashMap<i64, Node>,
    settings: Option<SchedulerSettings>,
    delete_files_requests: Vec<DeleteFilesJobRequest>,
}

/// Test/development store provider
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn next_id(state: &mut MemoryState) -> i64 {
        state.next_id += 1;
        state.next_id
    }

    // =========================================================================
    // Seed helpers (test graph construction)
    // =========================================================================

    pub fn add_source_file(&self, media_type: &str) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state
            .source_files
            .insert(id, SourceFile::new(id, format!("file-{id}.dat"), media_type));
        id
    }

    pub fn add_ingest(&self, source_file_id: i64) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state.ingests.insert(
            id,
            Ingest {
                id,
                source_file_id,
            },
        );
        id
    }

    pub fn create_purge_results(&self, source_file_id: i64, trigger_id: i64) {
        let mut state = self.lock();
        state
            .purge_results
            .insert(source_file_id, PurgeResults::new(source_file_id, trigger_id));
    }

    pub fn set_force_stop(&self, source_file_id: i64, force_stop: bool) {
        let mut state = self.lock();
        if let Some(results) = state.purge_results.get_mut(&source_file_id) {
            results.force_stop_purge = force_stop;
        }
    }

    pub fn add_job(&self, job_type_id: i64) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state
            .jobs
            .insert(id, Job::new(id, job_type_id, ExecutionStatus::Completed));
        id
    }

    pub fn add_job_input_file(&self, job_id: i64, source_file_id: i64) {
        self.lock().job_input_files.push((job_id, source_file_id));
    }

    /// Drop a job row (and its input links), simulating a completed
    /// delete-files job
    pub fn remove_job(&self, job_id: i64) {
        let mut state = self.lock();
        state.jobs.remove(&job_id);
        state.job_input_files.retain(|(job, _)| *job != job_id);
    }

    pub fn add_recipe(&self, recipe_type_id: i64) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state.recipes.insert(id, Recipe::new(id, recipe_type_id));
        id
    }

    pub fn add_recipe_input_file(&self, recipe_id: i64, source_file_id: i64) {
        self.lock().recipe_input_files.push((recipe_id, source_file_id));
    }

    /// Record that `recipe_id` replaced `superseded_recipe_id`
    pub fn set_supersedes(&self, recipe_id: i64, superseded_recipe_id: i64) {
        let mut state = self.lock();
        if let Some(recipe) = state.recipes.get_mut(&recipe_id) {
            recipe.superseded_recipe_id = Some(superseded_recipe_id);
        }
        if let Some(older) = state.recipes.get_mut(&superseded_recipe_id) {
            older.is_superseded = true;
        }
    }

    pub fn add_job_node(&self, recipe_id: i64, name: &str, job_id: i64) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state
            .recipe_nodes
            .push(RecipeNode::job_node(id, recipe_id, name, job_id));
        id
    }

    pub fn add_sub_recipe_node(&self, recipe_id: i64, name: &str, sub_recipe_id: i64) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state
            .recipe_nodes
            .push(RecipeNode::sub_recipe_node(id, recipe_id, name, sub_recipe_id));
        id
    }

    /// Record that `node` consumes the output of `depends_on`
    pub fn add_node_dependency(&self, recipe_id: i64, node: &str, depends_on: &str) {
        self.lock().recipe_node_links.push(RecipeNodeLink {
            recipe_id,
            node: node.to_string(),
            depends_on: depends_on.to_string(),
        });
    }

    pub fn add_cluster_node(&self, hostname: &str) -> i64 {
        let mut state = self.lock();
        let id = Self::next_id(&mut state);
        state.nodes.insert(id, Node::new(id, hostname));
        id
    }

    pub fn insert_job_execution(&self, exe: JobExecution) {
        self.lock().executions.insert(exe.id, exe);
    }

    pub fn set_scheduler_settings(&self, settings: SchedulerSettings) {
        self.lock().settings = Some(settings);
    }

    // =========================================================================
    // Assertion accessors
    // =========================================================================

    pub fn task_record(&self, task_id: &str) -> Option<TaskRecord> {
        self.lock().tasks.get(task_id).cloned()
    }

    pub fn delete_files_requests(&self) -> Vec<DeleteFilesJobRequest> {
        self.lock().delete_files_requests.clone()
    }

    pub fn ingest_count(&self, source_file_id: i64) -> usize {
        self.lock()
            .ingests
            .values()
            .filter(|i| i.source_file_id == source_file_id)
            .count()
    }

    // =========================================================================
    // Purge graph reads
    // =========================================================================

    pub fn purge_results(&self, source_file_id: i64) -> Result<PurgeResults, StoreError> {
        self.lock()
            .purge_results
            .get(&source_file_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("purge results", source_file_id))
    }

    pub fn source_file(&self, id: i64) -> Result<Option<SourceFile>, StoreError> {
        Ok(self.lock().source_files.get(&id).cloned())
    }

    pub fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        Ok(self.lock().recipes.get(&id).cloned())
    }

    pub fn recipe_nodes(&self, recipe_id: i64) -> Result<Vec<RecipeNode>, StoreError> {
        let state = self.lock();
        let mut nodes: Vec<RecipeNode> = state
            .recipe_nodes
            .iter()
            .filter(|n| n.recipe_id == recipe_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    pub fn leaf_jobs(&self, recipe_id: i64) -> Result<Vec<i64>, StoreError> {
        let state = self.lock();
        let mut jobs = Vec::new();
        for node in state
            .recipe_nodes
            .iter()
            .filter(|n| n.recipe_id == recipe_id)
        {
            let Some(job_id) = node.job_id() else {
                continue;
            };
            if !state.jobs.contains_key(&job_id) {
                continue;
            }
            let has_descendant = state
                .recipe_node_links
                .iter()
                .any(|l| l.recipe_id == recipe_id && l.depends_on == node.name);
            if !has_descendant {
                jobs.push(job_id);
            }
        }
        jobs.sort_unstable();
        Ok(jobs)
    }

    pub fn parent_recipes(&self, recipe_id: i64) -> Result<Vec<i64>, StoreError> {
        let state = self.lock();
        let mut parents: Vec<i64> = state
            .recipe_nodes
            .iter()
            .filter(|n| n.sub_recipe_id() == Some(recipe_id))
            .map(|n| n.recipe_id)
            .filter(|id| state.recipes.contains_key(id))
            .collect();
        parents.sort_unstable();
        parents.dedup();
        Ok(parents)
    }

    pub fn jobs_consuming_source_file(&self, source_file_id: i64) -> Result<Vec<i64>, StoreError> {
        let state = self.lock();
        let jobs_in_recipes: HashSet<i64> = state
            .recipe_nodes
            .iter()
            .filter_map(|n| n.job_id())
            .collect();
        let mut jobs: Vec<i64> = state
            .job_input_files
            .iter()
            .filter(|(job, file)| {
                *file == source_file_id
                    && state.jobs.contains_key(job)
                    && !jobs_in_recipes.contains(job)
            })
            .map(|(job, _)| *job)
            .collect();
        jobs.sort_unstable();
        jobs.dedup();
        Ok(jobs)
    }

    pub fn recipes_consuming_source_file(
        &self,
        source_file_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let state = self.lock();
        let mut recipes: Vec<i64> = state
            .recipe_input_files
            .iter()
            .filter(|(recipe, file)| {
                *file == source_file_id
                    && state
                        .recipes
                        .get(recipe)
                        .is_some_and(|r| !r.is_superseded)
            })
            .map(|(recipe, _)| *recipe)
            .collect();
        recipes.sort_unstable();
        recipes.dedup();
        Ok(recipes)
    }

    pub fn job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    // =========================================================================
    // Purge mutations
    // =========================================================================

    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state
            .recipe_node_links
            .retain(|l| l.recipe_id != recipe_id);
        state.recipe_nodes.retain(|n| n.recipe_id != recipe_id);
        Ok(state.recipes.remove(&recipe_id).is_some())
    }

    pub fn increment_recipes_deleted(&self, source_file_id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        let results = state
            .purge_results
            .get_mut(&source_file_id)
            .ok_or_else(|| StoreError::not_found("purge results", source_file_id))?;
        results.num_recipes_deleted += 1;
        Ok(())
    }

    pub fn delete_source_file(&self, source_file_id: i64) -> Result<(), StoreError> {
        let mut state = self.lock();
        state
            .ingests
            .retain(|_, i| i.source_file_id != source_file_id);
        state.source_files.remove(&source_file_id);
        Ok(())
    }

    pub fn set_purge_completed(
        &self,
        source_file_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let results = state
            .purge_results
            .get_mut(&source_file_id)
            .ok_or_else(|| StoreError::not_found("purge results", source_file_id))?;
        results.purge_completed = Some(when);
        Ok(())
    }

    pub fn enqueue_delete_files_job(
        &self,
        request: &DeleteFilesJobRequest,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        // Idempotent: a re-delivered message must not double-spawn
        if !state.delete_files_requests.contains(request) {
            state.delete_files_requests.push(request.clone());
        }
        Ok(())
    }

    // =========================================================================
    // Execution lifecycle
    // =========================================================================

    pub fn job_execution(&self, id: i64) -> Result<JobExecution, StoreError> {
        self.lock()
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job execution", id))
    }

    pub fn record_task_started(
        &self,
        exe_id: i64,
        task_id: &str,
        when: DateTime<Utc>,
        stdout_url: &str,
        stderr_url: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskRecord::new(task_id, exe_id));
        record.started = Some(when);
        record.stdout_url = Some(stdout_url.to_string());
        record.stderr_url = Some(stderr_url.to_string());
        Ok(())
    }

    pub fn complete_task(
        &self,
        exe_id: i64,
        task_id: &str,
        results: &TaskResults,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskRecord::new(task_id, exe_id));
        record.ended = Some(results.when);
        record.exit_code = results.exit_code;
        record.outcome = Some(TaskOutcome::Completed);
        Ok(())
    }

    pub fn fail_task(
        &self,
        exe_id: i64,
        task_id: &str,
        results: &TaskResults,
        error: &JobError,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state
            .tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskRecord::new(task_id, exe_id));
        record.ended = Some(results.when);
        record.exit_code = results.exit_code;
        record.outcome = Some(TaskOutcome::Failed);
        record.error_name = Some(error.name.clone());
        Ok(())
    }

    pub fn mark_execution_completed(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let exe = state
            .executions
            .get_mut(&exe_id)
            .ok_or_else(|| StoreError::not_found("job execution", exe_id))?;
        if !exe.status.is_terminal() {
            exe.status = ExecutionStatus::Completed;
            exe.ended = Some(when);
        }
        Ok(())
    }

    pub fn mark_execution_failed(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
        error: &JobError,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let exe = state
            .executions
            .get_mut(&exe_id)
            .ok_or_else(|| StoreError::not_found("job execution", exe_id))?;
        if !exe.status.is_terminal() {
            exe.status = ExecutionStatus::Failed;
            exe.ended = Some(when);
            exe.error_name = Some(error.name.clone());
            exe.error_category = Some(error.category);
        }
        Ok(())
    }

    // =========================================================================
    // Node back-pressure
    // =========================================================================

    pub fn node(&self, id: i64) -> Result<Option<Node>, StoreError> {
        Ok(self.lock().nodes.get(&id).cloned())
    }

    pub fn pause_node(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("node", id))?;
        node.is_paused = true;
        node.is_paused_errors = true;
        node.pause_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn count_node_system_failures(
        &self,
        node_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let state = self.lock();
        let jobs: HashSet<i64> = state
            .executions
            .values()
            .filter(|exe| {
                exe.node_id == node_id
                    && exe.status == ExecutionStatus::Failed
                    && exe.error_category == Some(crate::models::ErrorCategory::System)
                    && exe.ended.is_some_and(|ended| ended >= since)
            })
            .map(|exe| exe.job_id)
            .collect();
        Ok(jobs.len() as i64)
    }

    pub fn scheduler_settings(&self) -> Result<SchedulerSettings, StoreError> {
        Ok(self.lock().settings.unwrap_or_default())
    }
}
