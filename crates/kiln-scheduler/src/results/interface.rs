//! The declared-outputs slice of a job's interface.

use serde::{Deserialize, Serialize};

/// A declared output-file pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFileSpec {
    pub name: String,
    /// Glob-style pattern (`*` and `?`) matched against the output directory
    pub pattern: String,
    #[serde(default)]
    pub media_type: Option<String>,
    /// Whether more than one match is expected
    #[serde(default)]
    pub multiple: bool,
    #[serde(default = "default_required")]
    pub required: bool,
}

/// JSON type of a declared output value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputJsonType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl OutputJsonType {
    /// The JSON Schema type keyword for this output type
    pub fn schema_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// A declared JSON output captured from `seed.outputs.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputJsonSpec {
    pub name: String,
    pub json_type: OutputJsonType,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// The declared outputs of a job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobInterface {
    #[serde(default)]
    pub output_files: Vec<OutputFileSpec>,
    #[serde(default)]
    pub output_json: Vec<OutputJsonSpec>,
}

impl OutputFileSpec {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            media_type: None,
            multiple: false,
            required: true,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

impl OutputJsonSpec {
    pub fn new(name: impl Into<String>, json_type: OutputJsonType) -> Self {
        Self {
            name: name.into(),
            json_type,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}
