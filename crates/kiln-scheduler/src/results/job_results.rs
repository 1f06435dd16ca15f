//! The job results document: what an execution produced.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use kiln_shared::ValidationError;

use super::job_data::JobData;

/// Document version emitted by `get_dict`
const RESULTS_VERSION: &str = "6";

/// Results obtained after executing a job: two maps, `files` (parameter →
/// ordered file-id list) and `json` (parameter → value). Round-trips
/// through [`JobResults::get_dict`] / [`JobResults::from_dict`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobResults {
    files: BTreeMap<String, Vec<i64>>,
    json: BTreeMap<String, Value>,
}

impl JobResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a v6 results document
    pub fn from_dict(value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid("results document must be an object"))?;

        if let Some(version) = object.get("version") {
            if version.as_str() != Some(RESULTS_VERSION) {
                return Err(invalid(format!(
                    "unsupported results version: {version}"
                )));
            }
        }

        let mut results = Self::new();

        if let Some(files) = object.get("files") {
            let files = files
                .as_object()
                .ok_or_else(|| invalid("'files' must be an object"))?;
            for (name, ids) in files {
                let ids = ids
                    .as_array()
                    .ok_or_else(|| invalid(format!("files['{name}'] must be an array")))?;
                let ids = ids
                    .iter()
                    .map(|id| {
                        id.as_i64()
                            .ok_or_else(|| invalid(format!("files['{name}'] holds a non-integer")))
                    })
                    .collect::<Result<Vec<i64>, ValidationError>>()?;
                results.files.insert(name.clone(), ids);
            }
        }

        if let Some(json_map) = object.get("json") {
            let json_map = json_map
                .as_object()
                .ok_or_else(|| invalid("'json' must be an object"))?;
            for (name, value) in json_map {
                results.json.insert(name.clone(), value.clone());
            }
        }

        Ok(results)
    }

    /// The document representation of these results
    pub fn get_dict(&self) -> Value {
        let files: Map<String, Value> = self
            .files
            .iter()
            .map(|(name, ids)| (name.clone(), json!(ids)))
            .collect();
        let json_map: Map<String, Value> = self
            .json
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        json!({
            "version": RESULTS_VERSION,
            "files": files,
            "json": json_map,
        })
    }

    pub fn files(&self) -> &BTreeMap<String, Vec<i64>> {
        &self.files
    }

    pub fn json(&self) -> &BTreeMap<String, Value> {
        &self.json
    }

    /// Record a single file for an output parameter
    pub fn add_file_parameter(&mut self, name: impl Into<String>, file_id: i64) {
        self.files.insert(name.into(), vec![file_id]);
    }

    /// Record an ordered file list for an output parameter
    pub fn add_file_list_parameter(&mut self, name: impl Into<String>, file_ids: Vec<i64>) {
        self.files.insert(name.into(), file_ids);
    }

    /// Record a JSON output captured from `seed.outputs.json`
    pub fn add_output_json(&mut self, name: impl Into<String>, value: Value) {
        self.json.insert(name.into(), value);
    }

    /// Thread one of these results' outputs into another execution's data as
    /// an input: a single file becomes a scalar file input, anything else a
    /// list input.
    pub fn add_output_to_data(
        &self,
        output_name: &str,
        job_data: &mut JobData,
        input_name: &str,
    ) -> Result<(), ValidationError> {
        let output = self.files.get(output_name).ok_or_else(|| {
            ValidationError::new(
                "unknown-output",
                format!("results have no file output named '{output_name}'"),
            )
        })?;

        if output.len() == 1 {
            job_data.add_file_input(input_name, output[0]);
        } else {
            job_data.add_file_list_input(input_name, output.clone());
        }
        Ok(())
    }
}

fn invalid(description: impl Into<String>) -> ValidationError {
    ValidationError::new("invalid-results", description)
}
