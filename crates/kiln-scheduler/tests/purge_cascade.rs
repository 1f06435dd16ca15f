//! End-to-end purge cascades through the bus processor.
//!
//! These tests run the real message flow (queue → execute → follow-ons →
//! ack) over the in-memory providers, advancing the graph between cascade
//! rounds the way the cluster-side delete-files jobs would.

use std::sync::Arc;

use kiln_scheduler::messages::{PurgeCommand, PurgeCommandProcessor};
use kiln_shared::config::MessagingConfig;
use kiln_shared::messaging::{MessageClient, MessagingProvider};
use kiln_shared::store::{DataStore, InMemoryDataStore};

struct Cascade {
    mem: InMemoryDataStore,
    store: DataStore,
    processor: PurgeCommandProcessor,
}

async fn cascade() -> Cascade {
    let mem = InMemoryDataStore::new();
    let store = DataStore::InMemory(mem.clone());

    let provider = Arc::new(MessagingProvider::new_in_memory());
    let config = MessagingConfig::default();
    let client = MessageClient::from_config(provider, &config);
    client.initialize_queues().await.unwrap();

    let processor = PurgeCommandProcessor::new(client, store.clone(), &config);
    Cascade {
        mem,
        store,
        processor,
    }
}

/// A source file consumed by one recipe with two independent jobs. The
/// first cascade round spawns the delete-files jobs; once those jobs are
/// gone the second round deletes the recipe, and the third removes the
/// file itself.
#[tokio::test]
async fn test_full_purge_of_recipe_lineage() {
    let c = cascade().await;
    let file = c.mem.add_source_file("application/x-hdf");
    c.mem.add_ingest(file);
    c.mem.create_purge_results(file, 7);

    let recipe = c.mem.add_recipe(1);
    c.mem.add_recipe_input_file(recipe, file);
    let job_1 = c.mem.add_job(1);
    let job_2 = c.mem.add_job(2);
    c.mem.add_job_node(recipe, "job-1", job_1);
    c.mem.add_job_node(recipe, "job-2", job_2);

    // Round 1: purge_source_file → purge_recipe → two spawn_delete_files_job
    c.processor
        .run_cascade(PurgeCommand::purge_source_file(file, 7))
        .await
        .unwrap();

    let requests = c.mem.delete_files_requests();
    assert_eq!(requests.len(), 2);
    assert!(c.store.recipe(recipe).await.unwrap().is_some());
    assert!(c.store.source_file(file).await.unwrap().is_some());

    // The cluster-side delete-files jobs finish and remove the job rows
    c.mem.remove_job(job_1);
    c.mem.remove_job(job_2);

    // Round 2: the recipe has no leaf jobs left and is deleted
    c.processor
        .run_cascade(PurgeCommand::purge_recipe(recipe, 7, file))
        .await
        .unwrap();
    assert!(c.store.recipe(recipe).await.unwrap().is_none());
    assert_eq!(
        c.store.purge_results(file).await.unwrap().num_recipes_deleted,
        1
    );

    // Round 3: nothing consumes the file anymore; it is removed for good
    c.processor
        .run_cascade(PurgeCommand::purge_source_file(file, 7))
        .await
        .unwrap();
    assert!(c.store.source_file(file).await.unwrap().is_none());
    assert_eq!(c.mem.ingest_count(file), 0);

    let results = c.store.purge_results(file).await.unwrap();
    assert!(results.purge_completed.is_some());
    assert_eq!(results.num_recipes_deleted, 1);
}

/// A recipe chain R3 → R2 → R1 (each superseding the previous) is purged
/// back to the root, counting every deleted recipe.
#[tokio::test]
async fn test_superseded_chain_is_purged_to_the_root() {
    let c = cascade().await;
    let file = c.mem.add_source_file("text/plain");
    c.mem.create_purge_results(file, 7);

    let r1 = c.mem.add_recipe(1);
    let r2 = c.mem.add_recipe(1);
    let r3 = c.mem.add_recipe(1);
    c.mem.set_supersedes(r2, r1);
    c.mem.set_supersedes(r3, r2);
    c.mem.add_recipe_input_file(r3, file);

    c.processor
        .run_cascade(PurgeCommand::purge_source_file(file, 7))
        .await
        .unwrap();

    for recipe in [r1, r2, r3] {
        assert!(c.store.recipe(recipe).await.unwrap().is_none());
    }
    assert_eq!(
        c.store.purge_results(file).await.unwrap().num_recipes_deleted,
        3
    );
}

/// A parent recipe containing a sub-recipe: purging the child cascades to
/// the parent, and both are deleted once the child is gone.
#[tokio::test]
async fn test_parent_cascade_through_sub_recipe() {
    let c = cascade().await;
    let file = c.mem.add_source_file("text/plain");
    c.mem.create_purge_results(file, 7);

    let child = c.mem.add_recipe(2);
    let parent = c.mem.add_recipe(1);
    c.mem.add_sub_recipe_node(parent, "stage-a", child);

    c.processor
        .run_cascade(PurgeCommand::purge_recipe(child, 7, file))
        .await
        .unwrap();

    assert!(c.store.recipe(child).await.unwrap().is_none());
    assert!(c.store.recipe(parent).await.unwrap().is_none());
    assert_eq!(
        c.store.purge_results(file).await.unwrap().num_recipes_deleted,
        2
    );
}

/// Force-stop wins over everything: no rows are mutated and no messages
/// fan out, but the bus still converges.
#[tokio::test]
async fn test_force_stop_freezes_the_cascade() {
    let c = cascade().await;
    let file = c.mem.add_source_file("text/plain");
    c.mem.create_purge_results(file, 7);
    c.mem.set_force_stop(file, true);

    let recipe = c.mem.add_recipe(1);
    c.mem.add_recipe_input_file(recipe, file);

    let executed = c
        .processor
        .run_cascade(PurgeCommand::purge_source_file(file, 7))
        .await
        .unwrap();
    assert_eq!(executed, 1);

    assert!(c.store.recipe(recipe).await.unwrap().is_some());
    assert!(c.store.source_file(file).await.unwrap().is_some());
    let results = c.store.purge_results(file).await.unwrap();
    assert_eq!(results.num_recipes_deleted, 0);
    assert!(results.purge_completed.is_none());
}

/// Re-delivering every message of a finished cascade converges without new
/// work or double counting.
#[tokio::test]
async fn test_redelivery_after_completion_converges() {
    let c = cascade().await;
    let file = c.mem.add_source_file("text/plain");
    c.mem.create_purge_results(file, 7);
    let recipe = c.mem.add_recipe(1);
    c.mem.add_recipe_input_file(recipe, file);

    c.processor
        .run_cascade(PurgeCommand::purge_source_file(file, 7))
        .await
        .unwrap();
    let counted = c.store.purge_results(file).await.unwrap().num_recipes_deleted;

    // Simulate the bus redelivering the whole cascade
    for command in [
        PurgeCommand::purge_source_file(file, 7),
        PurgeCommand::purge_recipe(recipe, 7, file),
    ] {
        c.processor.run_cascade(command).await.unwrap();
    }

    assert_eq!(
        c.store.purge_results(file).await.unwrap().num_recipes_deleted,
        counted
    );
}
