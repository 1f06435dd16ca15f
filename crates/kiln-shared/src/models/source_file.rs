//! Source file rows: externally-ingested inputs, the roots of data lineage
//! and the subjects of purge cascades.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A persisted input file with its media type and data-type tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: i64,
    pub file_name: String,
    pub media_type: String,
    pub data_types: BTreeSet<String>,
}

impl SourceFile {
    pub fn new(id: i64, file_name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            media_type: media_type.into(),
            data_types: BTreeSet::new(),
        }
    }

    /// Tag the file with a data-type label
    pub fn add_data_type_tag(&mut self, tag: impl Into<String>) {
        self.data_types.insert(tag.into());
    }
}

/// Ingest bookkeeping row tying a source file to the ingest that produced it;
/// deleted together with the file at the end of a purge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingest {
    pub id: i64,
    pub source_file_id: i64,
}
