//! Spawn a system delete-files job for one job's products.

use serde::{Deserialize, Serialize};
use tracing::debug;

use kiln_shared::store::{DataStore, DeleteFilesJobRequest, StoreError};

use super::CommandOutcome;

/// Command message that requests a system delete-files job for `job_id`'s
/// product files. The containerized deletion itself runs on the cluster;
/// this message only records the idempotent spawn request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnDeleteFilesJob {
    pub job_id: i64,
    pub trigger_id: i64,
    pub source_file_id: i64,
    /// True when spawned by a purge cascade: the delete-files job also
    /// removes the job's own rows when it finishes
    pub purge: bool,
}

impl SpawnDeleteFilesJob {
    pub fn new(job_id: i64, trigger_id: i64, source_file_id: i64, purge: bool) -> Self {
        Self {
            job_id,
            trigger_id,
            source_file_id,
            purge,
        }
    }

    pub(super) async fn execute(&self, store: &DataStore) -> Result<CommandOutcome, StoreError> {
        let results = store.purge_results(self.source_file_id).await?;
        if results.force_stop_purge {
            debug!(
                job_id = self.job_id,
                source_file_id = self.source_file_id,
                "purge force-stopped, not spawning delete-files job"
            );
            return Ok(CommandOutcome::success());
        }

        // Job already gone: an earlier delivery (or the delete-files job
        // itself) finished the work
        if store.job(self.job_id).await?.is_none() {
            debug!(job_id = self.job_id, "job already removed, nothing to spawn");
            return Ok(CommandOutcome::success());
        }

        store
            .enqueue_delete_files_job(&DeleteFilesJobRequest {
                job_id: self.job_id,
                trigger_id: self.trigger_id,
                source_file_id: self.source_file_id,
                purge: self.purge,
            })
            .await?;

        Ok(CommandOutcome::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_shared::store::InMemoryDataStore;

    fn setup() -> (InMemoryDataStore, DataStore) {
        let mem = InMemoryDataStore::new();
        let store = DataStore::InMemory(mem.clone());
        (mem, store)
    }

    #[tokio::test]
    async fn test_spawns_request_for_live_job() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);
        let job = mem.add_job(1);

        let outcome = SpawnDeleteFilesJob::new(job, 7, file, true)
            .execute(&store)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.new_messages.is_empty());

        let requests = mem.delete_files_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].job_id, job);
        assert!(requests[0].purge);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_double_spawn() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);
        let job = mem.add_job(1);

        let message = SpawnDeleteFilesJob::new(job, 7, file, true);
        message.execute(&store).await.unwrap();
        message.execute(&store).await.unwrap();

        assert_eq!(mem.delete_files_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job_is_a_successful_noop() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);

        let outcome = SpawnDeleteFilesJob::new(999, 7, file, true)
            .execute(&store)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(mem.delete_files_requests().is_empty());
    }

    #[tokio::test]
    async fn test_force_stop_spawns_nothing() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);
        mem.set_force_stop(file, true);
        let job = mem.add_job(1);

        let outcome = SpawnDeleteFilesJob::new(job, 7, file, true)
            .execute(&store)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(mem.delete_files_requests().is_empty());
    }
}
