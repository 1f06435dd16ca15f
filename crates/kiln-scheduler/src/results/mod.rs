//! # Results Aggregation
//!
//! Captures a completed execution's outputs: files matched on disk (with
//! optional `<path>.metadata.json` side-cars), JSON values from
//! `seed.outputs.json`, and storage of the captured files through the
//! process-wide data-file store.

pub mod capture;
pub mod interface;
pub mod job_data;
pub mod job_results;
pub mod outputs_json;
pub mod sidecar;
pub mod store;

pub use capture::OutputCapture;
pub use interface::{JobInterface, OutputFileSpec, OutputJsonSpec, OutputJsonType};
pub use job_data::{FileInput, JobData};
pub use job_results::JobResults;
pub use outputs_json::{OutputsJson, SEED_OUTPUTS_FILE};
pub use sidecar::{SidecarMetadata, METADATA_SUFFIX};
pub use store::{
    data_file_store, register_data_file_store, teardown_data_file_store, DataFileStore,
    DATA_FILE_STORE,
};
