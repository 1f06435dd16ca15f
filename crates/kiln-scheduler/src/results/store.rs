//! The process-wide data-file store.
//!
//! Storage of captured product files is delegated to a backend resolved
//! from a registry keyed by name. The store is a lifecycle-managed
//! singleton: register at startup, tear down on shutdown. A missing
//! registration is a fatal execution error, never a silent skip.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use kiln_shared::models::{JobExecution, ProductFileMetadata};
use kiln_shared::{KilnError, KilnResult};

/// Registry key of the data-file store
pub const DATA_FILE_STORE: &str = "DATA_FILE_STORE";

/// Backend that persists captured product files into workspaces
#[async_trait]
pub trait DataFileStore: Send + Sync + std::fmt::Debug {
    /// Store the files, grouped by target workspace, for `exe`. Returns a
    /// map of local path → the stored file's new id.
    async fn store_files(
        &self,
        files_by_workspace: HashMap<i64, Vec<ProductFileMetadata>>,
        input_file_ids: &[i64],
        exe: &JobExecution,
    ) -> KilnResult<HashMap<PathBuf, i64>>;
}

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<dyn DataFileStore>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register the process-wide data-file store
pub fn register_data_file_store(store: Arc<dyn DataFileStore>) {
    REGISTRY
        .write()
        .unwrap_or_else(|p| p.into_inner())
        .insert(DATA_FILE_STORE.to_string(), store);
}

/// Resolve the registered data-file store; fatal when none is registered
pub fn data_file_store() -> KilnResult<Arc<dyn DataFileStore>> {
    REGISTRY
        .read()
        .unwrap_or_else(|p| p.into_inner())
        .get(DATA_FILE_STORE)
        .cloned()
        .ok_or_else(|| KilnError::execution("no data file store registered"))
}

/// Remove the registered data-file store
pub fn teardown_data_file_store() {
    REGISTRY
        .write()
        .unwrap_or_else(|p| p.into_inner())
        .remove(DATA_FILE_STORE);
}
