//! Per-execution data wiring: input file ids, output→workspace mapping,
//! and the file inputs threaded from prior executions' outputs.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// A file-typed input value: a single file or an ordered list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileInput {
    Single(i64),
    List(Vec<i64>),
}

/// The data wiring of one execution
#[derive(Debug, Clone, Default)]
pub struct JobData {
    output_workspaces: HashMap<String, i64>,
    input_file_ids: Vec<i64>,
    file_inputs: BTreeMap<String, FileInput>,
}

impl JobData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an output parameter's files to a workspace
    pub fn map_output_workspace(&mut self, output_name: impl Into<String>, workspace_id: i64) {
        self.output_workspaces.insert(output_name.into(), workspace_id);
    }

    pub fn workspace_for(&self, output_name: &str) -> Option<i64> {
        self.output_workspaces.get(output_name).copied()
    }

    pub fn add_input_file_id(&mut self, file_id: i64) {
        self.input_file_ids.push(file_id);
    }

    pub fn input_file_ids(&self) -> &[i64] {
        &self.input_file_ids
    }

    /// Record a scalar file input
    pub fn add_file_input(&mut self, input_name: impl Into<String>, file_id: i64) {
        self.file_inputs
            .insert(input_name.into(), FileInput::Single(file_id));
    }

    /// Record a file-list input
    pub fn add_file_list_input(&mut self, input_name: impl Into<String>, file_ids: Vec<i64>) {
        self.file_inputs
            .insert(input_name.into(), FileInput::List(file_ids));
    }

    pub fn file_input(&self, input_name: &str) -> Option<&FileInput> {
        self.file_inputs.get(input_name)
    }
}
