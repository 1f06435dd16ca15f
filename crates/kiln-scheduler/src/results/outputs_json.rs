//! Capture of JSON outputs from `seed.outputs.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Map, Value};
use tracing::warn;

use kiln_shared::{KilnError, KilnResult, ValidationError};

use super::interface::OutputJsonSpec;

/// Filename a job writes its JSON outputs to
pub const SEED_OUTPUTS_FILE: &str = "seed.outputs.json";

/// JSON outputs read and validated from a job's `seed.outputs.json`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputsJson {
    values: BTreeMap<String, Value>,
}

impl OutputsJson {
    /// Build the JSON Schema for the declared outputs
    pub fn construct_schema(specs: &[OutputJsonSpec]) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in specs {
            properties.insert(
                spec.name.clone(),
                json!({"type": spec.json_type.schema_type()}),
            );
            if spec.required {
                required.push(Value::String(spec.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Read `seed.outputs.json` from `dir`, validate it against the declared
    /// outputs, and keep the recognized keys. A missing or unreadable file
    /// is non-fatal and returns `None`; a present-but-invalid document is a
    /// validation error.
    pub fn read(dir: &Path, specs: &[OutputJsonSpec]) -> KilnResult<Option<Self>> {
        let path = dir.join(SEED_OUTPUTS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(path = %path.display(), %error, "no seed.outputs.json file found to process");
                return Ok(None);
            }
        };

        let document: Value = serde_json::from_str(&raw).map_err(|e| {
            KilnError::Validation(ValidationError::new("invalid-seed-outputs", e.to_string()))
        })?;

        let schema = Self::construct_schema(specs);
        let validator = jsonschema::validator_for(&schema)
            .map_err(|e| KilnError::execution(format!("bad outputs schema: {e}")))?;
        if !validator.is_valid(&document) {
            return Err(KilnError::Validation(ValidationError::new(
                "invalid-seed-outputs",
                format!("{} does not match the declared outputs", path.display()),
            )));
        }

        let mut values = BTreeMap::new();
        for spec in specs {
            if let Some(value) = document.get(&spec.name) {
                values.insert(spec.name.clone(), value.clone());
            }
        }

        Ok(Some(Self { values }))
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}
