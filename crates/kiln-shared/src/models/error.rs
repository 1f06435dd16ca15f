//! Failure classification for jobs and tasks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broad failure category used for attribution and node back-pressure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    /// Infrastructure fault (node lost, timeout, cluster failure); counted
    /// toward node back-pressure
    System,
    /// Failure reported by the job itself (non-zero exit, bad outputs)
    Algorithm,
    /// Failure attributed to the input data
    Data,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "SYSTEM",
            Self::Algorithm => "ALGORITHM",
            Self::Data => "DATA",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYSTEM" => Ok(Self::System),
            "ALGORITHM" => Ok(Self::Algorithm),
            "DATA" => Ok(Self::Data),
            other => Err(format!("unknown error category: {other}")),
        }
    }
}

/// A named, classified error definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub name: String,
    pub category: ErrorCategory,
    pub description: String,
}

impl JobError {
    pub fn new(
        name: impl Into<String>,
        category: ErrorCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            description: description.into(),
        }
    }

    /// True for errors that count toward node back-pressure
    pub fn is_system(&self) -> bool {
        self.category == ErrorCategory::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in [
            ErrorCategory::System,
            ErrorCategory::Algorithm,
            ErrorCategory::Data,
        ] {
            let parsed: ErrorCategory = category.to_string().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("TRANSIENT".parse::<ErrorCategory>().is_err());
    }

    #[test]
    fn test_category_wire_format() {
        assert_eq!(
            serde_json::to_value(ErrorCategory::System).unwrap(),
            serde_json::json!("SYSTEM")
        );
    }

    #[test]
    fn test_is_system() {
        assert!(JobError::new("node-lost", ErrorCategory::System, "node went away").is_system());
        assert!(!JobError::new("bad-pixels", ErrorCategory::Data, "corrupt input").is_system());
    }
}
