//! Field validation.
//!
//! Built-in constraints are checked first (`required`, then the length
//! bounds of string values), followed by the field's `valid_when` rules in
//! order. The first failure wins and is recorded on the field's
//! `valid_when` display record.

use std::borrow::Cow;

use serde_json::Value;

use crate::pointer::{RulePointer, RuleSet};
use crate::rules::RuleEvaluator;
use crate::schema::{Field, Schema, ValidWhen};
use crate::scope::{Document, FieldAt};
use crate::step_model::{replace_fields, step_position};
use crate::FormError;

/// Alert for a required field without a value.
pub const REQUIRED_ALERT: &str = "Required *";

/// Alert for a failing rule that has no message.
pub const INVALID_VALUE_ALERT: &str = "Invalid value";

/// Result of validating every field of a step.
#[derive(Debug, Clone)]
pub struct StepValidation<'a> {
    /// The schema with alerts written to the step's fields
    pub schema: Cow<'a, Schema>,

    pub valid: bool,

    /// `id`s of the fields that failed, in field order
    pub invalid_fields: Vec<String>,
}

/// Validates fields against built-in constraints and `valid_when` rules.
pub struct FieldValidator<'e> {
    evaluator: &'e RuleEvaluator,
}

impl<'e> FieldValidator<'e> {
    pub fn new(evaluator: &'e RuleEvaluator) -> Self {
        Self { evaluator }
    }

    /// Validate one field.
    ///
    /// # Returns
    ///
    /// The field with its alert set or cleared. Validation failures are not
    /// errors; only a rule that cannot be evaluated is.
    pub fn validate_field(
        &self,
        field: &Field,
        document: &Document,
        at: FieldAt,
    ) -> Result<Field, FormError> {
        let mut validated = field.clone();
        match self.first_failure(field, document, at)? {
            Some(alert) => {
                let display = validated.valid_when.get_or_insert_with(ValidWhen::default);
                display.show_alert_message = true;
                display.alert = alert;
            }
            None => {
                if let Some(display) = validated.valid_when.as_mut() {
                    display.show_alert_message = false;
                    display.alert.clear();
                }
            }
        }
        Ok(validated)
    }

    fn first_failure(
        &self,
        field: &Field,
        document: &Document,
        at: FieldAt,
    ) -> Result<Option<String>, FormError> {
        if let Some(alert) = builtin_failure(field) {
            return Ok(Some(alert));
        }

        let Some(valid_when) = &field.valid_when else {
            return Ok(None);
        };

        for (position, rule) in valid_when.rules.iter().enumerate() {
            let outcome = self
                .evaluator
                .evaluate(rule, document, at)
                .map_err(|source| FormError::Rule {
                    pointer: RulePointer::rule(
                        document.step_index(at.step).unwrap_or_default(),
                        field.id.as_str(),
                        RuleSet::ValidWhen,
                        position,
                    ),
                    source,
                })?;
            if outcome.result {
                let alert = if outcome.message.is_empty() {
                    INVALID_VALUE_ALERT.to_string()
                } else {
                    outcome.message
                };
                return Ok(Some(alert));
            }
        }
        Ok(None)
    }

    /// Validate every field of step `index`.
    pub fn validate_step<'a>(
        &self,
        schema: &'a Schema,
        index: i64,
    ) -> Result<StepValidation<'a>, FormError> {
        let position = step_position(schema, index).ok_or(FormError::StepNotFound(index))?;
        let mut document = Document::new(schema)?;
        let mut fields = schema.steps[position].fields.clone();
        let mut changed = false;
        let mut invalid_fields = Vec::new();

        for (i, field) in fields.iter_mut().enumerate() {
            let at = FieldAt::new(position, i);
            let validated = self.validate_field(field, &document, at)?;
            if validated.alert().is_some() {
                invalid_fields.push(validated.id.clone());
            }
            if validated != *field {
                document.sync_field(at, &validated)?;
                *field = validated;
                changed = true;
            }
        }

        tracing::debug!(
            step = index,
            invalid = invalid_fields.len(),
            "Step validated"
        );

        Ok(StepValidation {
            schema: if changed {
                Cow::Owned(replace_fields(schema, position, fields))
            } else {
                Cow::Borrowed(schema)
            },
            valid: invalid_fields.is_empty(),
            invalid_fields,
        })
    }
}

/// Check `required` and the length bounds.
fn builtin_failure(field: &Field) -> Option<String> {
    let empty = match &field.value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    };
    if field.required && empty {
        return Some(REQUIRED_ALERT.to_string());
    }

    let Value::String(text) = &field.value else {
        return None;
    };
    let length = text.trim().chars().count();

    match (field.min_length, field.max_length) {
        (Some(min), Some(max)) if length < min || length > max => Some(format!(
            "The input has to be between {} and {} characters",
            min, max
        )),
        (Some(min), None) if length < min => Some(format!("At least {} characters", min)),
        (None, Some(max)) if length > max => Some(format!(
            "The input has to be less than {} characters",
            max
        )),
        _ => None,
    }
}
