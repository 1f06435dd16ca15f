//! Product file metadata captured from a completed execution's outputs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Metadata for one output file captured after a successful main task.
///
/// The provenance fields are projected from the optional
/// `<path>.metadata.json` side-car; all of them may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFileMetadata {
    /// The declared output parameter this file was captured for
    pub output_name: String,
    pub local_path: PathBuf,
    pub media_type: Option<String>,
    /// GeoJSON document from the side-car's top-level `data`
    pub geojson: Option<serde_json::Value>,
    pub data_started: Option<String>,
    pub data_ended: Option<String>,
    pub source_started: Option<String>,
    pub source_ended: Option<String>,
    pub source_sensor_class: Option<String>,
    pub source_sensor: Option<String>,
    pub source_collection: Option<String>,
    pub source_task: Option<String>,
}

impl ProductFileMetadata {
    pub fn new(
        output_name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        media_type: Option<String>,
    ) -> Self {
        Self {
            output_name: output_name.into(),
            local_path: local_path.into(),
            media_type,
            geojson: None,
            data_started: None,
            data_ended: None,
            source_started: None,
            source_ended: None,
            source_sensor_class: None,
            source_sensor: None,
            source_collection: None,
            source_task: None,
        }
    }
}
