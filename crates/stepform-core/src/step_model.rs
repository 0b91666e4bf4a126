//! Lookups and copy-on-write updates over the step tree.
//!
//! Steps are addressed by their `index` and fields by their `id`; array
//! positions are an implementation detail of the schema.

use serde_json::Value;

use crate::schema::{Field, Schema, Step};
use crate::FormError;

/// Position of the field `id` in the step.
pub fn find_field_index(step: &Step, id: &str) -> Option<usize> {
    step.fields.iter().position(|f| f.id == id)
}

/// The step currently shown.
///
/// A schema with a single step always shows it, whatever `activeStep` says.
pub fn find_step_by_active_index(schema: &Schema) -> Option<&Step> {
    active_step_position(schema).map(|position| &schema.steps[position])
}

/// Position of the step currently shown.
pub fn active_step_position(schema: &Schema) -> Option<usize> {
    if schema.steps.len() == 1 {
        Some(0)
    } else {
        step_position(schema, schema.active_step)
    }
}

/// Position of the step with the given `index`.
pub fn step_position(schema: &Schema, index: i64) -> Option<usize> {
    schema.steps.iter().position(|s| s.index == index)
}

pub fn step_by_index(schema: &Schema, index: i64) -> Option<&Step> {
    schema.steps.iter().find(|s| s.index == index)
}

/// Set a field's value in place.
///
/// # Returns
///
/// * `Ok(())` - The value was set
/// * `Err(FormError::FieldNotFound)` - The step has no field `id`
pub fn set_field_value(step: &mut Step, id: &str, value: Value) -> Result<(), FormError> {
    let position = find_field_index(step, id).ok_or_else(|| FormError::FieldNotFound {
        step: step.index,
        field: id.to_string(),
    })?;
    step.fields[position].value = value;
    Ok(())
}

/// A copy of `schema` with the step of the same `index` replaced.
pub fn replace_step(schema: &Schema, step: Step) -> Result<Schema, FormError> {
    let position = step_position(schema, step.index).ok_or(FormError::StepNotFound(step.index))?;
    let mut next = schema.clone();
    next.steps[position] = step;
    Ok(next)
}

/// A copy of `schema` with the fields of step `index` replaced.
pub(crate) fn replace_fields(
    schema: &Schema,
    position: usize,
    fields: Vec<Field>,
) -> Schema {
    let mut next = schema.clone();
    next.steps[position].fields = fields;
    next
}

/// Steps that are part of the linear sequence (not modal).
pub fn visible_steps(schema: &Schema) -> Vec<&Step> {
    schema.steps.iter().filter(|s| !s.modal).collect()
}
