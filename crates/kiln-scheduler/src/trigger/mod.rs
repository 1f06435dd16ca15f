//! # Ingest Trigger Condition
//!
//! The predicate deciding whether an ingested source file should trigger
//! recipe creation. Four clauses, all of which must hold; empty sets are
//! neutral.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use kiln_shared::models::SourceFile;

/// Condition matching a source file against media-type and data-type sets
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerCondition {
    /// Required media type; absent matches any
    pub media_type: Option<String>,
    /// Every one of these tags must be on the file
    pub required_data_types: BTreeSet<String>,
    /// At least one of these tags must be on the file (when non-empty)
    pub any_of_data_types: BTreeSet<String>,
    /// None of these tags may be on the file
    pub not_data_types: BTreeSet<String>,
}

impl TriggerCondition {
    pub fn new(
        media_type: Option<String>,
        required_data_types: BTreeSet<String>,
        any_of_data_types: BTreeSet<String>,
        not_data_types: BTreeSet<String>,
    ) -> Self {
        Self {
            media_type,
            required_data_types,
            any_of_data_types,
            not_data_types,
        }
    }

    /// True iff the file satisfies every clause of the condition
    pub fn is_condition_met(&self, source_file: &SourceFile) -> bool {
        if let Some(media_type) = &self.media_type {
            if *media_type != source_file.media_type {
                return false;
            }
        }

        if !self.required_data_types.is_subset(&source_file.data_types) {
            return false;
        }

        if !self.any_of_data_types.is_empty()
            && self.any_of_data_types.is_disjoint(&source_file.data_types)
        {
            return false;
        }

        self.not_data_types.is_disjoint(&source_file.data_types)
    }
}
