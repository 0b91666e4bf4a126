//! Structural checks for form documents.
//!
//! A raw document is matched against spec/form.schema.json before it is
//! deserialized. Every mismatch is reported with the JSON pointer of the
//! offending node, where serde would stop at the first one.

use std::fmt;
use std::sync::OnceLock;

use jsonschema::Validator;
use serde::Serialize;
use serde_json::Value;

use super::SchemaError;

const FORM_SCHEMA_JSON: &str = include_str!("../../../../spec/form.schema.json");

static FORM_VALIDATOR: OnceLock<Result<Validator, String>> = OnceLock::new();

fn form_validator() -> Result<&'static Validator, SchemaError> {
    FORM_VALIDATOR
        .get_or_init(|| {
            let schema: Value = serde_json::from_str(FORM_SCHEMA_JSON)
                .map_err(|e| format!("form schema is not valid JSON: {}", e))?;
            jsonschema::options()
                .build(&schema)
                .map_err(|e| format!("form schema does not compile: {}", e))
        })
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// A node of a form document that does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer to the node; empty for the document root
    pub pointer: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer.is_empty() {
            write!(f, "{} at the document root", self.message)
        } else {
            write!(f, "{} at {}", self.message, self.pointer)
        }
    }
}

/// List every structural problem of `document`, in validator order.
pub fn structure_violations(document: &Value) -> Result<Vec<Violation>, SchemaError> {
    let validator = form_validator()?;
    Ok(validator
        .iter_errors(document)
        .map(|error| Violation {
            pointer: error.instance_path.to_string(),
            message: error.to_string(),
        })
        .collect())
}

/// Reject a document with any structural problem.
///
/// # Returns
///
/// * `Ok(())` - The document has the expected shape
/// * `Err(SchemaError::Structure)` - One entry per violation
pub fn validate_form_document(document: &Value) -> Result<(), SchemaError> {
    let violations = structure_violations(document)?;
    if violations.is_empty() {
        return Ok(());
    }
    Err(SchemaError::Structure(
        violations.iter().map(ToString::to_string).collect(),
    ))
}
