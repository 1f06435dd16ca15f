//! # Purge Command Messages
//!
//! The command messages driving cascading recipe/job/file deletion, and the
//! bus processor that executes them.
//!
//! Every message is a tagged record with a typed payload; the wire form is
//! the internally tagged JSON of [`PurgeCommand`]. The bus delivers
//! at-least-once, so every `execute` is idempotent with respect to its
//! observable effects and derives follow-on messages from persisted state
//! only: re-executing a message after its target is gone returns success
//! and emits nothing.

pub mod processor;
pub mod purge_recipe;
pub mod purge_source_file;
pub mod spawn_delete_files_job;

pub use processor::PurgeCommandProcessor;
pub use purge_recipe::PurgeRecipe;
pub use purge_source_file::PurgeSourceFile;
pub use spawn_delete_files_job::SpawnDeleteFilesJob;

use serde::{Deserialize, Serialize};

use kiln_shared::store::{DataStore, StoreError};

/// The wire-level purge command: a `type` tag plus the message's payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurgeCommand {
    PurgeSourceFile(PurgeSourceFile),
    PurgeRecipe(PurgeRecipe),
    SpawnDeleteFilesJob(SpawnDeleteFilesJob),
}

impl PurgeCommand {
    pub fn purge_source_file(source_file_id: i64, trigger_id: i64) -> Self {
        Self::PurgeSourceFile(PurgeSourceFile::new(source_file_id, trigger_id))
    }

    pub fn purge_recipe(recipe_id: i64, trigger_id: i64, source_file_id: i64) -> Self {
        Self::PurgeRecipe(PurgeRecipe::new(recipe_id, trigger_id, source_file_id))
    }

    pub fn spawn_delete_files_job(
        job_id: i64,
        trigger_id: i64,
        source_file_id: i64,
        purge: bool,
    ) -> Self {
        Self::SpawnDeleteFilesJob(SpawnDeleteFilesJob::new(
            job_id,
            trigger_id,
            source_file_id,
            purge,
        ))
    }

    /// The message's type tag
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::PurgeSourceFile(_) => "purge_source_file",
            Self::PurgeRecipe(_) => "purge_recipe",
            Self::SpawnDeleteFilesJob(_) => "spawn_delete_files_job",
        }
    }

    /// Execute the command against the store. Infrastructure faults bubble
    /// up so the bus redelivers; no-op outcomes return success.
    pub async fn execute(&self, store: &DataStore) -> Result<CommandOutcome, StoreError> {
        match self {
            Self::PurgeSourceFile(message) => message.execute(store).await,
            Self::PurgeRecipe(message) => message.execute(store).await,
            Self::SpawnDeleteFilesJob(message) => message.execute(store).await,
        }
    }
}

/// The result of executing a command: success plus follow-on messages
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub success: bool,
    pub new_messages: Vec<PurgeCommand>,
}

impl CommandOutcome {
    /// A successful outcome with no follow-on work
    pub fn success() -> Self {
        Self {
            success: true,
            new_messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: PurgeCommand) {
        self.new_messages.push(message);
    }

    /// Follow-on messages of one type, for assertions and routing
    pub fn messages_of_type(&self, message_type: &str) -> Vec<&PurgeCommand> {
        self.new_messages
            .iter()
            .filter(|m| m.message_type() == message_type)
            .collect()
    }
}
