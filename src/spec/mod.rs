//! Pipeline specification types.
//!
//! A [`PipelineSpec`] is the structured description the collaborator produces
//! from an accepted request: where data comes from, where it goes, what
//! transformation to apply and on what schedule. The enums are closed; serde
//! rejects unknown fields and out-of-enum values, which is what makes the
//! schema contract enforceable at the adapter boundary.

pub mod synthesizer;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

pub use synthesizer::{SpecSynthesizer, SpecSynthesizerConfig};

/// Where pipeline data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalCsv,
    LocalJson,
    RelationalDb,
    Api,
}

impl SourceKind {
    /// File extension implied by this source kind, if any.
    pub fn required_extension(&self) -> Option<&'static str> {
        match self {
            SourceKind::LocalCsv => Some(".csv"),
            SourceKind::LocalJson => Some(".json"),
            SourceKind::RelationalDb | SourceKind::Api => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::LocalCsv => write!(f, "local_csv"),
            SourceKind::LocalJson => write!(f, "local_json"),
            SourceKind::RelationalDb => write!(f, "relational_db"),
            SourceKind::Api => write!(f, "api"),
        }
    }
}

/// Where pipeline output lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    EmbeddedDb,
    RelationalDb,
    File,
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestinationKind::EmbeddedDb => write!(f, "embedded_db"),
            DestinationKind::RelationalDb => write!(f, "relational_db"),
            DestinationKind::File => write!(f, "file"),
        }
    }
}

/// A structured pipeline specification.
///
/// All fields are required and no extra fields are permitted; violations
/// surface as [`SpecError::SchemaInvalid`] when parsing collaborator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    /// Pipeline name; made globally unique with a timestamp suffix at
    /// synthesis time.
    pub name: String,
    /// Kind of source the pipeline reads from.
    pub source_kind: SourceKind,
    /// Source path, pattern or locator.
    pub source_path: String,
    /// Kind of destination the pipeline writes to.
    pub destination_kind: DestinationKind,
    /// Destination table or file name, without extension.
    pub destination_name: String,
    /// Transformation to apply, in prose.
    pub transformation: String,
    /// Cron schedule expression.
    pub schedule: String,
}

impl PipelineSpec {
    /// Validate cross-field invariants not expressible in serde alone.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::SchemaInvalid("name must not be empty".into()));
        }
        if let Some(ext) = self.source_kind.required_extension() {
            if !self.source_path.to_lowercase().ends_with(ext) {
                return Err(SpecError::SchemaInvalid(format!(
                    "source kind {} requires a source path ending in '{}', got '{}'",
                    self.source_kind, ext, self.source_path
                )));
            }
        }
        Ok(())
    }

    /// The JSON Schema sent as the response format for spec synthesis.
    pub fn response_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "A name for the pipeline"
                },
                "source_kind": {
                    "type": "string",
                    "description": "The kind of source the data comes from",
                    "enum": ["local_csv", "local_json", "relational_db", "api"]
                },
                "source_path": {
                    "type": "string",
                    "description": "Path or pattern of the source file, or a database/API locator"
                },
                "destination_kind": {
                    "type": "string",
                    "description": "The kind of destination for the data",
                    "enum": ["embedded_db", "relational_db", "file"]
                },
                "destination_name": {
                    "type": "string",
                    "description": "The name of the destination table or file without extension"
                },
                "transformation": {
                    "type": "string",
                    "description": "Transformations to apply to the data"
                },
                "schedule": {
                    "type": "string",
                    "description": "Cron schedule for the pipeline"
                }
            },
            "required": [
                "name", "source_kind", "source_path", "destination_kind",
                "destination_name", "transformation", "schedule"
            ],
            "additionalProperties": false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_spec() -> PipelineSpec {
        PipelineSpec {
            name: "sales_summary".to_string(),
            source_kind: SourceKind::LocalCsv,
            source_path: "sales*.csv".to_string(),
            destination_kind: DestinationKind::EmbeddedDb,
            destination_name: "sales_summary".to_string(),
            transformation: "sum revenue by region".to_string(),
            schedule: "0 6 * * *".to_string(),
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn csv_kind_requires_csv_extension() {
        let mut spec = valid_spec();
        spec.source_path = "sales.parquet".to_string();
        assert!(matches!(
            spec.validate(),
            Err(SpecError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn json_kind_requires_json_extension() {
        let mut spec = valid_spec();
        spec.source_kind = SourceKind::LocalJson;
        spec.source_path = "events.csv".to_string();
        assert!(spec.validate().is_err());

        spec.source_path = "events*.json".to_string();
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn db_kind_has_no_extension_requirement() {
        let mut spec = valid_spec();
        spec.source_kind = SourceKind::RelationalDb;
        spec.source_path = "postgres://localhost/shop#orders".to_string();
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn missing_field_is_rejected() {
        let json = r#"{
            "name": "x",
            "source_kind": "local_csv",
            "source_path": "x.csv",
            "destination_kind": "file",
            "destination_name": "out",
            "transformation": "none"
        }"#;
        assert!(serde_json::from_str::<PipelineSpec>(json).is_err());
    }

    #[test]
    fn extra_field_is_rejected() {
        let json = r#"{
            "name": "x",
            "source_kind": "local_csv",
            "source_path": "x.csv",
            "destination_kind": "file",
            "destination_name": "out",
            "transformation": "none",
            "schedule": "@daily",
            "owner": "nobody"
        }"#;
        assert!(serde_json::from_str::<PipelineSpec>(json).is_err());
    }

    #[test]
    fn out_of_enum_kind_is_rejected() {
        let json = r#"{
            "name": "x",
            "source_kind": "ftp",
            "source_path": "x.csv",
            "destination_kind": "file",
            "destination_name": "out",
            "transformation": "none",
            "schedule": "@daily"
        }"#;
        assert!(serde_json::from_str::<PipelineSpec>(json).is_err());
    }

    #[test]
    fn schema_lists_all_required_fields() {
        let schema = PipelineSpec::response_schema();
        let required = schema["required"].as_array().expect("required array");
        assert_eq!(required.len(), 7);
        assert_eq!(schema["additionalProperties"], false);
    }
}
