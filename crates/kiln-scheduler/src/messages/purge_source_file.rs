//! The purge entry point: remove a source file and everything derived from
//! it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kiln_shared::store::{DataStore, StoreError};

use super::{CommandOutcome, PurgeCommand};

/// Command message that removes a source file, fanning out to the jobs and
/// recipes that consumed it.
///
/// The file row itself (and its ingest rows) is deleted only once nothing
/// consumes it anymore, which a later re-delivery of this same message
/// observes after the spawned deletions finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeSourceFile {
    pub source_file_id: i64,
    pub trigger_id: i64,
}

impl PurgeSourceFile {
    pub fn new(source_file_id: i64, trigger_id: i64) -> Self {
        Self {
            source_file_id,
            trigger_id,
        }
    }

    pub(super) async fn execute(&self, store: &DataStore) -> Result<CommandOutcome, StoreError> {
        let results = store.purge_results(self.source_file_id).await?;
        if results.force_stop_purge {
            debug!(
                source_file_id = self.source_file_id,
                "purge force-stopped, skipping source file"
            );
            return Ok(CommandOutcome::success());
        }

        let jobs = store.jobs_consuming_source_file(self.source_file_id).await?;
        let recipes = store
            .recipes_consuming_source_file(self.source_file_id)
            .await?;

        let mut outcome = CommandOutcome::success();

        // Recipe-less jobs get their products deleted directly
        for job_id in &jobs {
            outcome.push(PurgeCommand::spawn_delete_files_job(
                *job_id,
                self.trigger_id,
                self.source_file_id,
                true,
            ));
        }

        // Live recipes cascade through their own purge messages
        for recipe_id in &recipes {
            outcome.push(PurgeCommand::purge_recipe(
                *recipe_id,
                self.trigger_id,
                self.source_file_id,
            ));
        }

        // Nothing consumes the file anymore: remove it and stamp completion
        if jobs.is_empty() && recipes.is_empty() {
            store.delete_source_file(self.source_file_id).await?;
            store
                .set_purge_completed(self.source_file_id, Utc::now())
                .await?;
            info!(
                source_file_id = self.source_file_id,
                trigger_id = self.trigger_id,
                "source file purge completed"
            );
        }

        Ok(outcome)
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
    async fn test_force_stop_short_circuits() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        let job = mem.add_job(1);
        mem.add_job_input_file(job, file);
        mem.create_purge_results(file, 7);
        mem.set_force_stop(file, true);

        let outcome = PurgeSourceFile::new(file, 7).execute(&store).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.new_messages.is_empty());
        // Nothing was mutated
        assert!(store.source_file(file).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fans_out_to_jobs_and_recipes() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);

        let standalone_job = mem.add_job(1);
        mem.add_job_input_file(standalone_job, file);

        let recipe = mem.add_recipe(1);
        mem.add_recipe_input_file(recipe, file);

        let outcome = PurgeSourceFile::new(file, 7).execute(&store).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.new_messages.len(), 2);
        assert_eq!(
            outcome.new_messages[0],
            PurgeCommand::spawn_delete_files_job(standalone_job, 7, file, true)
        );
        assert_eq!(
            outcome.new_messages[1],
            PurgeCommand::purge_recipe(recipe, 7, file)
        );

        // File survives until its consumers are gone
        assert!(store.source_file(file).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_deletes_file_when_nothing_consumes_it() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.add_ingest(file);
        mem.create_purge_results(file, 7);

        let outcome = PurgeSourceFile::new(file, 7).execute(&store).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.new_messages.is_empty());

        assert!(store.source_file(file).await.unwrap().is_none());
        assert_eq!(mem.ingest_count(file), 0);
        assert!(store
            .purge_results(file)
            .await
            .unwrap()
            .purge_completed
            .is_some());
    }

    #[tokio::test]
    async fn test_reexecution_after_deletion_is_a_noop() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);

        let message = PurgeSourceFile::new(file, 7);
        message.execute(&store).await.unwrap();
        let outcome = message.execute(&store).await.unwrap();

        assert!(outcome.success);
        assert!(outcome.new_messages.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_recipes_are_skipped() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");
        mem.create_purge_results(file, 7);

        let old = mem.add_recipe(1);
        let new = mem.add_recipe(1);
        mem.add_recipe_input_file(old, file);
        mem.add_recipe_input_file(new, file);
        mem.set_supersedes(new, old);

        let outcome = PurgeSourceFile::new(file, 7).execute(&store).await.unwrap();
        let recipes = outcome.messages_of_type("purge_recipe");
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0], &PurgeCommand::purge_recipe(new, 7, file));
    }

    #[tokio::test]
    async fn test_missing_purge_results_bubbles_up() {
        let (mem, store) = setup();
        let file = mem.add_source_file("text/plain");

        let result = PurgeSourceFile::new(file, 7).execute(&store).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }
}
