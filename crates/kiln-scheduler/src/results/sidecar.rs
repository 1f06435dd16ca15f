//! Side-car metadata parsing.
//!
//! An output file may carry provenance in an adjacent
//! `<path>.metadata.json`: a JSON object whose top-level `data` is a GeoJSON
//! document and whose `properties` holds the optional provenance fields.

use serde::Deserialize;
use serde_json::Value;

use kiln_shared::models::ProductFileMetadata;
use kiln_shared::ValidationError;

/// Filename suffix of side-car metadata files
pub const METADATA_SUFFIX: &str = ".metadata.json";

/// Parsed side-car document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SidecarMetadata {
    /// The GeoJSON document describing the product's footprint
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub properties: SidecarProperties,
}

/// Optional provenance properties carried by a side-car
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarProperties {
    pub data_started: Option<String>,
    pub data_ended: Option<String>,
    pub source_started: Option<String>,
    pub source_ended: Option<String>,
    pub source_sensor_class: Option<String>,
    pub source_sensor: Option<String>,
    pub source_collection: Option<String>,
    pub source_task: Option<String>,
}

impl SidecarMetadata {
    pub fn from_json(value: Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value)
            .map_err(|e| ValidationError::new("invalid-metadata", e.to_string()))
    }

    pub fn from_str(raw: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(raw)
            .map_err(|e| ValidationError::new("invalid-metadata", e.to_string()))
    }

    /// Project this side-car's fields into a product metadata record
    pub fn apply_to(&self, product: &mut ProductFileMetadata) {
        product.geojson = self.data.clone();
        product.data_started = self.properties.data_started.clone();
        product.data_ended = self.properties.data_ended.clone();
        product.source_started = self.properties.source_started.clone();
        product.source_ended = self.properties.source_ended.clone();
        product.source_sensor_class = self.properties.source_sensor_class.clone();
        product.source_sensor = self.properties.source_sensor.clone();
        product.source_collection = self.properties.source_collection.clone();
        product.source_task = self.properties.source_task.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_sidecar_projects_all_fields() {
        let sidecar = SidecarMetadata::from_json(json!({
            "data": {"type": "Feature", "geometry": null, "properties": {}},
            "properties": {
                "dataStarted": "2024-05-01T00:00:00Z",
                "dataEnded": "2024-05-01T00:10:00Z",
                "sourceStarted": "2024-04-30T23:00:00Z",
                "sourceEnded": "2024-05-01T01:00:00Z",
                "sourceSensorClass": "EO",
                "sourceSensor": "msi-4",
                "sourceCollection": "l1c",
                "sourceTask": "calibration"
            }
        }))
        .unwrap();

        let mut product =
            kiln_shared::models::ProductFileMetadata::new("tiles", "/out/tile-0.png", None);
        sidecar.apply_to(&mut product);

        assert!(product.geojson.is_some());
        assert_eq!(product.data_started.as_deref(), Some("2024-05-01T00:00:00Z"));
        assert_eq!(product.source_sensor.as_deref(), Some("msi-4"));
        assert_eq!(product.source_task.as_deref(), Some("calibration"));
    }

    #[test]
    fn test_all_fields_are_optional() {
        let sidecar = SidecarMetadata::from_json(json!({})).unwrap();
        assert!(sidecar.data.is_none());
        assert!(sidecar.properties.data_started.is_none());
    }

    #[test]
    fn test_malformed_document_is_a_validation_error() {
        let err = SidecarMetadata::from_str("{not json").unwrap_err();
        assert_eq!(err.name, "invalid-metadata");

        let err = SidecarMetadata::from_json(json!({"properties": "nope"})).unwrap_err();
        assert_eq!(err.name, "invalid-metadata");
    }
}
