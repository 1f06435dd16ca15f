//! Output capture: the three passes that turn a finished main task's output
//! directory into job results.
//!
//! 1. Enumerate files matching the declared output patterns, projecting any
//!    `<path>.metadata.json` side-car into the product metadata. Side-car
//!    parse failures are logged and sibling captures proceed.
//! 2. Read and validate `seed.outputs.json`; a missing file is non-fatal.
//! 3. Group captured files by target workspace and hand them to the
//!    registered data-file store, then reverse-index the returned ids into
//!    the results' `files` map. A captured file missing from disk at store
//!    time is fatal: the caller fails the job with an ALGORITHM error.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{info, warn};

use kiln_shared::models::{JobExecution, ProductFileMetadata};
use kiln_shared::{KilnError, KilnResult, ValidationError};

use super::interface::{JobInterface, OutputFileSpec, OutputJsonSpec};
use super::job_data::JobData;
use super::job_results::JobResults;
use super::outputs_json::OutputsJson;
use super::sidecar::{SidecarMetadata, METADATA_SUFFIX};
use super::store::data_file_store;

/// Aggregates a completed execution's outputs from its output directory
#[derive(Debug, Clone)]
pub struct OutputCapture {
    output_dir: PathBuf,
}

impl OutputCapture {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Run all three passes and return the assembled results
    pub async fn perform_post_steps(
        &self,
        interface: &JobInterface,
        job_data: &JobData,
        exe: &JobExecution,
    ) -> KilnResult<JobResults> {
        let mut results = JobResults::new();

        let captured = self.capture_output_files(&interface.output_files)?;
        self.capture_output_json(&interface.output_json, &mut results)?;
        self.store_output_files(captured, job_data, exe, &mut results)
            .await?;

        Ok(results)
    }

    /// Pass 1: evaluate file patterns and read side-car metadata
    fn capture_output_files(
        &self,
        specs: &[OutputFileSpec],
    ) -> KilnResult<BTreeMap<String, Vec<ProductFileMetadata>>> {
        let mut captured = BTreeMap::new();

        for spec in specs {
            let mut products = Vec::new();
            for path in self.matched_files(&spec.pattern)? {
                info!(path = %path.display(), output = %spec.name, "file detected for output capture");

                let mut product =
                    ProductFileMetadata::new(&spec.name, &path, spec.media_type.clone());

                let sidecar_path = sidecar_path_for(&path);
                if sidecar_path.is_file() {
                    info!(path = %sidecar_path.display(), "capturing metadata from side-car file");
                    match read_sidecar(&sidecar_path) {
                        Ok(sidecar) => sidecar.apply_to(&mut product),
                        Err(error) => {
                            // Bad side-car: keep the product, lose the metadata
                            warn!(
                                path = %sidecar_path.display(),
                                %error,
                                "ignoring unparseable side-car metadata"
                            );
                        }
                    }
                }

                products.push(product);
            }

            if spec.required && products.is_empty() {
                return Err(KilnError::Validation(ValidationError::new(
                    "missing-output",
                    format!(
                        "required output '{}' matched no files for pattern '{}'",
                        spec.name, spec.pattern
                    ),
                )));
            }

            captured.insert(spec.name.clone(), products);
        }

        Ok(captured)
    }

    /// Pass 2: merge recognized `seed.outputs.json` values
    fn capture_output_json(
        &self,
        specs: &[OutputJsonSpec],
        results: &mut JobResults,
    ) -> KilnResult<()> {
        if specs.is_empty() {
            return Ok(());
        }

        if let Some(outputs) = OutputsJson::read(&self.output_dir, specs)? {
            for (name, value) in outputs.values() {
                results.add_output_json(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Pass 3: group by workspace, store, and reverse-index the new ids
    async fn store_output_files(
        &self,
        captured: BTreeMap<String, Vec<ProductFileMetadata>>,
        job_data: &JobData,
        exe: &JobExecution,
        results: &mut JobResults,
    ) -> KilnResult<()> {
        let mut files_by_workspace: HashMap<i64, Vec<ProductFileMetadata>> = HashMap::new();
        let mut params_by_path: HashMap<PathBuf, String> = HashMap::new();

        for (name, products) in &captured {
            let workspace_id = job_data.workspace_for(name).ok_or_else(|| {
                KilnError::execution(format!("no workspace mapped for output '{name}'"))
            })?;

            for product in products {
                if !product.local_path.is_file() {
                    return Err(KilnError::execution(format!(
                        "{} is not a valid file",
                        product.local_path.display()
                    )));
                }
                params_by_path.insert(product.local_path.clone(), name.clone());
                files_by_workspace
                    .entry(workspace_id)
                    .or_default()
                    .push(product.clone());
            }
        }

        let store = data_file_store()?;
        let stored = store
            .store_files(files_by_workspace, job_data.input_file_ids(), exe)
            .await?;

        let mut param_file_ids: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for (path, file_id) in &stored {
            if let Some(name) = params_by_path.get(path) {
                param_file_ids.entry(name.clone()).or_default().push(*file_id);
            }
        }

        for (name, mut file_ids) in param_file_ids {
            file_ids.sort_unstable();
            results.add_file_list_parameter(name, file_ids);
        }

        Ok(())
    }

    /// Files in the output directory whose names match `pattern`
    fn matched_files(&self, pattern: &str) -> KilnResult<Vec<PathBuf>> {
        let regex = glob_to_regex(pattern)?;

        let entries = std::fs::read_dir(&self.output_dir).map_err(|e| {
            KilnError::execution(format!(
                "cannot read output directory {}: {e}",
                self.output_dir.display()
            ))
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| KilnError::execution(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // Side-cars are carried with their products, never captured alone
            if file_name.ends_with(METADATA_SUFFIX) {
                continue;
            }
            if regex.is_match(file_name) {
                matches.push(path);
            }
        }

        matches.sort();
        Ok(matches)
    }
}

fn sidecar_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

fn read_sidecar(path: &Path) -> KilnResult<SidecarMetadata> {
    let raw = std::fs::read_to_string(path).map_err(|e| KilnError::execution(e.to_string()))?;
    Ok(SidecarMetadata::from_str(&raw)?)
}

/// Translate a glob pattern (`*`, `?`) into an anchored regex
fn glob_to_regex(pattern: &str) -> KilnResult<Regex> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    Regex::new(&translated)
        .map_err(|e| KilnError::execution(format!("invalid output pattern '{pattern}': {e}")))
}
