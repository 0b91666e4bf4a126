//! Form schema parsing and validation.
//!
//! Form schemas are JSON or YAML documents validated against
//! spec/form.schema.json, then deserialized into typed steps and fields.

mod model;
mod structure;

use thiserror::Error;

pub use model::{Field, Rule, Schema, Step, ValidWhen};
pub(crate) use model::normalize_aliases;
pub use structure::{structure_violations, validate_form_document, Violation};

/// Errors that can occur when loading a schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema structure invalid: {}", .0.join("; "))]
    Structure(Vec<String>),

    #[error("Duplicate field id '{field}' in step {step}")]
    DuplicateField { step: i64, field: String },

    #[error("Duplicate step index: {0}")]
    DuplicateStep(i64),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Failed to load schema: {0}")]
    LoadError(String),
}
