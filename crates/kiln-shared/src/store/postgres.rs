//! Postgres store provider.
//!
//! Runtime sqlx queries against the kiln relational schema (owned by the
//! migration pipeline, outside this repo). Each method is one transaction;
//! multi-statement mutations open an explicit one.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use super::{DeleteFilesJobRequest, StoreError};
use crate::models::{
    ErrorCategory, ExecutionStatus, Job, JobError, JobExecution, Node, PurgeResults, Recipe,
    RecipeNode, SchedulerSettings, SourceFile, TaskResults,
};
use crate::resources::NodeResources;

/// Postgres-backed store provider
#[derive(Debug, Clone)]
pub struct PgDataStore {
    pool: PgPool,
}

impl PgDataStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_recipe(row: &PgRow) -> Result<Recipe, StoreError> {
        Ok(Recipe {
            id: row.try_get("id")?,
            recipe_type_id: row.try_get("recipe_type_id")?,
            is_superseded: row.try_get("is_superseded")?,
            superseded_recipe_id: row.try_get("superseded_recipe_id")?,
            jobs_total: row.try_get("jobs_total")?,
            jobs_running: row.try_get("jobs_running")?,
            jobs_completed: row.try_get("jobs_completed")?,
        })
    }

    fn map_recipe_node(row: &PgRow) -> Result<RecipeNode, StoreError> {
        let id: i64 = row.try_get("id")?;
        let recipe_id: i64 = row.try_get("recipe_id")?;
        let name: String = row.try_get("node_name")?;
        let job_id: Option<i64> = row.try_get("job_id")?;
        let sub_recipe_id: Option<i64> = row.try_get("sub_recipe_id")?;

        match (job_id, sub_recipe_id) {
            (Some(job_id), None) => Ok(RecipeNode::job_node(id, recipe_id, name, job_id)),
            (None, Some(sub_id)) => Ok(RecipeNode::sub_recipe_node(id, recipe_id, name, sub_id)),
            _ => Err(StoreError::invalid_value(format!(
                "recipe node {id} must reference exactly one of job or sub-recipe"
            ))),
        }
    }

    fn map_execution(row: &PgRow) -> Result<JobExecution, StoreError> {
        let status: String = row.try_get("status")?;
        let status =
            ExecutionStatus::from_str(&status).map_err(StoreError::invalid_value)?;
        let error_category: Option<String> = row.try_get("error_category")?;
        let error_category = error_category
            .map(|c| ErrorCategory::from_str(&c).map_err(StoreError::invalid_value))
            .transpose()?;

        Ok(JobExecution {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            job_type_id: row.try_get("job_type_id")?,
            node_id: row.try_get("node_id")?,
            is_system: row.try_get("is_system")?,
            status,
            num_attempts: row.try_get("num_attempts")?,
            max_attempts: row.try_get("max_attempts")?,
            resources: NodeResources {
                cpus: row.try_get("cpus")?,
                mem_mb: row.try_get("mem_mb")?,
                disk_mb: row.try_get("disk_mb")?,
            },
            queued: row.try_get("queued")?,
            started: row.try_get("started")?,
            ended: row.try_get("ended")?,
            error_name: row.try_get("error_name")?,
            error_category,
        })
    }

    // =========================================================================
    // Purge graph reads
    // =========================================================================

    pub async fn purge_results(&self, source_file_id: i64) -> Result<PurgeResults, StoreError> {
        let row = sqlx::query(
            "SELECT source_file_id, trigger_id, force_stop_purge, num_recipes_deleted, \
             purge_completed FROM purge_results WHERE source_file_id = $1",
        )
        .bind(source_file_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("purge results", source_file_id))?;

        Ok(PurgeResults {
            source_file_id: row.try_get("source_file_id")?,
            trigger_id: row.try_get("trigger_id")?,
            force_stop_purge: row.try_get("force_stop_purge")?,
            num_recipes_deleted: row.try_get("num_recipes_deleted")?,
            purge_completed: row.try_get("purge_completed")?,
        })
    }

    pub async fn source_file(&self, id: i64) -> Result<Option<SourceFile>, StoreError> {
        let row = sqlx::query("SELECT id, file_name, media_type FROM source_files WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut file = SourceFile::new(
            row.try_get::<i64, _>("id")?,
            row.try_get::<String, _>("file_name")?,
            row.try_get::<String, _>("media_type")?,
        );

        let tags: Vec<String> = sqlx::query_scalar(
            "SELECT tag FROM source_file_data_types WHERE source_file_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        for tag in tags {
            file.add_data_type_tag(tag);
        }

        Ok(Some(file))
    }

    pub async fn recipe(&self, id: i64) -> Result<Option<Recipe>, StoreError> {
        let row = sqlx::query(
            "SELECT id, recipe_type_id, is_superseded, superseded_recipe_id, jobs_total, \
             jobs_running, jobs_completed FROM recipes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::map_recipe).transpose()
    }

    pub async fn recipe_nodes(&self, recipe_id: i64) -> Result<Vec<RecipeNode>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, recipe_id, node_name, job_id, sub_recipe_id FROM recipe_nodes \
             WHERE recipe_id = $1 ORDER BY id",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::map_recipe_node).collect()
    }

    pub async fn leaf_jobs(&self, recipe_id: i64) -> Result<Vec<i64>, StoreError> {
        let jobs = sqlx::query_scalar(
            "SELECT rn.job_id FROM recipe_nodes rn \
             JOIN jobs j ON j.id = rn.job_id \
             WHERE rn.recipe_id = $1 AND rn.job_id IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM recipe_node_links l \
                             WHERE l.recipe_id = rn.recipe_id AND l.depends_on = rn.node_name) \
             ORDER BY rn.job_id",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    pub async fn parent_recipes(&self, recipe_id: i64) -> Result<Vec<i64>, StoreError> {
        let parents = sqlx::query_scalar(
            "SELECT DISTINCT rn.recipe_id FROM recipe_nodes rn \
             JOIN recipes r ON r.id = rn.recipe_id \
             WHERE rn.sub_recipe_id = $1 ORDER BY rn.recipe_id",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(parents)
    }

    pub async fn jobs_consuming_source_file(
        &self,
        source_file_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let jobs = sqlx::query_scalar(
            "SELECT DISTINCT jif.job_id FROM job_input_files jif \
             JOIN jobs j ON j.id = jif.job_id \
             WHERE jif.source_file_id = $1 \
             AND NOT EXISTS (SELECT 1 FROM recipe_nodes rn WHERE rn.job_id = jif.job_id) \
             ORDER BY jif.job_id",
        )
        .bind(source_file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    pub async fn recipes_consuming_source_file(
        &self,
        source_file_id: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let recipes = sqlx::query_scalar(
            "SELECT DISTINCT rif.recipe_id FROM recipe_input_files rif \
             JOIN recipes r ON r.id = rif.recipe_id \
             WHERE rif.source_file_id = $1 AND r.is_superseded = FALSE \
             ORDER BY rif.recipe_id",
        )
        .bind(source_file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recipes)
    }

    pub async fn job(&self, id: i64) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT id, job_type_id, status FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(Job::new(
            row.try_get("id")?,
            row.try_get("job_type_id")?,
            ExecutionStatus::from_str(&status).map_err(StoreError::invalid_value)?,
        )))
    }

    // =========================================================================
    // Purge mutations
    // =========================================================================

    pub async fn delete_recipe(&self, recipe_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipe_node_links WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM recipe_nodes WHERE recipe_id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn increment_recipes_deleted(&self, source_file_id: i64) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE purge_results SET num_recipes_deleted = num_recipes_deleted + 1 \
             WHERE source_file_id = $1",
        )
        .bind(source_file_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::not_found("purge results", source_file_id));
        }
        Ok(())
    }

    pub async fn delete_source_file(&self, source_file_id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ingests WHERE source_file_id = $1")
            .bind(source_file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM source_file_data_types WHERE source_file_id = $1")
            .bind(source_file_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM source_files WHERE id = $1")
            .bind(source_file_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_purge_completed(
        &self,
        source_file_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE purge_results SET purge_completed = $2 WHERE source_file_id = $1",
        )
        .bind(source_file_id)
        .bind(when)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::not_found("purge results", source_file_id));
        }
        Ok(())
    }

    pub async fn enqueue_delete_files_job(
        &self,
        request: &DeleteFilesJobRequest,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO delete_files_requests (job_id, trigger_id, source_file_id, purge, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) \
             ON CONFLICT (job_id, trigger_id) DO NOTHING",
        )
        .bind(request.job_id)
        .bind(request.trigger_id)
        .bind(request.source_file_id)
        .bind(request.purge)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // =========================================================================
    // Execution lifecycle
    // =========================================================================

    pub async fn job_execution(&self, id: i64) -> Result<JobExecution, StoreError> {
        let row = sqlx::query(
            "SELECT id, job_id, job_type_id, node_id, is_system, status, num_attempts, \
             max_attempts, cpus, mem_mb, disk_mb, queued, started, ended, error_name, \
             error_category FROM job_executions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("job execution", id))?;

        Self::map_execution(&row)
    }

    pub async fn record_task_started(
        &self,
        exe_id: i64,
        task_id: &str,
        when: DateTime<Utc>,
        stdout_url: &str,
        stderr_url: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO execution_tasks (task_id, exe_id, started, stdout_url, stderr_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (task_id) DO UPDATE \
             SET started = EXCLUDED.started, stdout_url = EXCLUDED.stdout_url, \
                 stderr_url = EXCLUDED.stderr_url",
        )
        .bind(task_id)
        .bind(exe_id)
        .bind(when)
        .bind(stdout_url)
        .bind(stderr_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_task(
        &self,
        exe_id: i64,
        task_id: &str,
        results: &TaskResults,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO execution_tasks (task_id, exe_id, ended, exit_code, outcome) \
             VALUES ($1, $2, $3, $4, 'COMPLETED') \
             ON CONFLICT (task_id) DO UPDATE \
             SET ended = EXCLUDED.ended, exit_code = EXCLUDED.exit_code, outcome = 'COMPLETED'",
        )
        .bind(task_id)
        .bind(exe_id)
        .bind(results.when)
        .bind(results.exit_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_task(
        &self,
        exe_id: i64,
        task_id: &str,
        results: &TaskResults,
        error: &JobError,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO execution_tasks (task_id, exe_id, ended, exit_code, outcome, error_name) \
             VALUES ($1, $2, $3, $4, 'FAILED', $5) \
             ON CONFLICT (task_id) DO UPDATE \
             SET ended = EXCLUDED.ended, exit_code = EXCLUDED.exit_code, outcome = 'FAILED', \
                 error_name = EXCLUDED.error_name",
        )
        .bind(task_id)
        .bind(exe_id)
        .bind(results.when)
        .bind(results.exit_code)
        .bind(&error.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A zero-row update is a no-op only when the execution exists and is
    /// already terminal; a missing row is an error, matching the in-memory
    /// provider.
    async fn verify_execution_exists(&self, exe_id: i64) -> Result<(), StoreError> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM job_executions WHERE id = $1")
            .bind(exe_id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("job execution", exe_id)),
        }
    }

    pub async fn mark_execution_completed(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE job_executions SET status = 'COMPLETED', ended = $2 \
             WHERE id = $1 AND status IN ('QUEUED', 'RUNNING')",
        )
        .bind(exe_id)
        .bind(when)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return self.verify_execution_exists(exe_id).await;
        }
        Ok(())
    }

    pub async fn mark_execution_failed(
        &self,
        exe_id: i64,
        when: DateTime<Utc>,
        error: &JobError,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE job_executions SET status = 'FAILED', ended = $2, error_name = $3, \
             error_category = $4 WHERE id = $1 AND status IN ('QUEUED', 'RUNNING')",
        )
        .bind(exe_id)
        .bind(when)
        .bind(&error.name)
        .bind(error.category.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return self.verify_execution_exists(exe_id).await;
        }
        Ok(())
    }

    // =========================================================================
    // Node back-pressure
    // =========================================================================

    pub async fn node(&self, id: i64) -> Result<Option<Node>, StoreError> {
        let row = sqlx::query(
            "SELECT id, hostname, is_paused, is_paused_errors, pause_reason \
             FROM nodes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Node {
            id: row.try_get("id")?,
            hostname: row.try_get("hostname")?,
            is_paused: row.try_get("is_paused")?,
            is_paused_errors: row.try_get("is_paused_errors")?,
            pause_reason: row.try_get("pause_reason")?,
        }))
    }

    pub async fn pause_node(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE nodes SET is_paused = TRUE, is_paused_errors = TRUE, pause_reason = $2 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::not_found("node", id));
        }
        Ok(())
    }

    pub async fn count_node_system_failures(
        &self,
        node_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT job_id) FROM job_executions \
             WHERE node_id = $1 AND status = 'FAILED' AND error_category = 'SYSTEM' \
             AND ended >= $2",
        )
        .bind(node_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn scheduler_settings(&self) -> Result<SchedulerSettings, StoreError> {
        let row = sqlx::query(
            "SELECT node_error_period, max_node_errors FROM scheduler_settings LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(SchedulerSettings {
                node_error_period: row.try_get("node_error_period")?,
                max_node_errors: row.try_get("max_node_errors")?,
            }),
            None => Ok(SchedulerSettings::default()),
        }
    }
}
