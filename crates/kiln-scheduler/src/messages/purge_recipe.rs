//! Cascading recipe purge.
//!
//! Deletion proceeds from the leaves upward: leaf jobs, child sub-recipes,
//! and superseded predecessors are purged before their parents. A recipe's
//! own row is deleted only when its nodes yield no outbound work.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kiln_shared::store::{DataStore, StoreError};

use super::{CommandOutcome, PurgeCommand};

/// Command message that purges one recipe of a source file's lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeRecipe {
    pub recipe_id: i64,
    pub trigger_id: i64,
    pub source_file_id: i64,
}

impl PurgeRecipe {
    pub fn new(recipe_id: i64, trigger_id: i64, source_file_id: i64) -> Self {
        Self {
            recipe_id,
            trigger_id,
            source_file_id,
        }
    }

    fn purge_recipe_message(&self, recipe_id: i64) -> PurgeCommand {
        PurgeCommand::purge_recipe(recipe_id, self.trigger_id, self.source_file_id)
    }

    pub(super) async fn execute(&self, store: &DataStore) -> Result<CommandOutcome, StoreError> {
        let results = store.purge_results(self.source_file_id).await?;
        if results.force_stop_purge {
            debug!(
                recipe_id = self.recipe_id,
                source_file_id = self.source_file_id,
                "purge force-stopped, skipping recipe"
            );
            return Ok(CommandOutcome::success());
        }

        // Already deleted by an earlier delivery: converge silently
        let Some(recipe) = store.recipe(self.recipe_id).await? else {
            debug!(recipe_id = self.recipe_id, "recipe already purged");
            return Ok(CommandOutcome::success());
        };

        let mut outcome = CommandOutcome::success();

        // Leaf jobs (no node depends on theirs) get their products deleted
        let leaf_jobs = store.leaf_jobs(recipe.id).await?;
        for job_id in &leaf_jobs {
            outcome.push(PurgeCommand::spawn_delete_files_job(
                *job_id,
                self.trigger_id,
                self.source_file_id,
                true,
            ));
        }

        // The predecessor chain this recipe superseded is purged too
        if let Some(superseded_id) = recipe.superseded_recipe_id {
            if store.recipe(superseded_id).await?.is_some() {
                outcome.push(self.purge_recipe_message(superseded_id));
            }
        }

        // Parents containing this recipe as a sub-recipe cascade upward
        for parent_id in store.parent_recipes(recipe.id).await? {
            outcome.push(self.purge_recipe_message(parent_id));
        }

        // Child sub-recipes that still exist cascade downward
        let mut live_sub_recipes = Vec::new();
        for node in store.recipe_nodes(recipe.id).await? {
            if let Some(sub_id) = node.sub_recipe_id() {
                if store.recipe(sub_id).await?.is_some() {
                    live_sub_recipes.push(sub_id);
                }
            }
        }
        for sub_id in &live_sub_recipes {
            outcome.push(self.purge_recipe_message(*sub_id));
        }

        // No outbound work for this recipe's own nodes: delete the node rows
        // and then the recipe row. The counter increments only on the
        // delivery that actually deleted the row.
        if leaf_jobs.is_empty() && live_sub_recipes.is_empty() {
            if store.delete_recipe(recipe.id).await? {
                store
                    .increment_recipes_deleted(self.source_file_id)
                    .await?;
                info!(
                    recipe_id = recipe.id,
                    source_file_id = self.source_file_id,
                    "recipe purged"
                );
            }
        }

        Ok(outcome)
    }
}
