//! The JSON document rules are evaluated against.
//!
//! A [`Document`] is the serialized form of a [`Schema`]. Rule bindings are
//! paths into it, so one node is reachable through `fieldValue`, `stepFlow`
//! and `schemaFlow` alike, and an assignment through one is visible through
//! the others.

use serde_json::Value;

use crate::expr::{write_path, PathSeg};
use crate::schema::{normalize_aliases, Field, Schema};
use crate::FormError;

/// Position of a field: array positions, not step `index` or field `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAt {
    pub step: usize,
    pub field: usize,
}

impl FieldAt {
    pub fn new(step: usize, field: usize) -> Self {
        Self { step, field }
    }

    /// Path of the step holding the field.
    pub fn step_path(&self) -> Vec<PathSeg> {
        vec![PathSeg::key("steps"), PathSeg::Index(self.step)]
    }

    /// Path of the field object.
    pub fn field_path(&self) -> Vec<PathSeg> {
        let mut path = self.step_path();
        path.push(PathSeg::key("fields"));
        path.push(PathSeg::Index(self.field));
        path
    }

    /// Path of the field's value.
    pub fn value_path(&self) -> Vec<PathSeg> {
        let mut path = self.field_path();
        path.push(PathSeg::key("value"));
        path
    }
}

/// A schema serialized for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Value,
}

impl Document {
    pub fn new(schema: &Schema) -> Result<Self, FormError> {
        Ok(Self {
            root: schema.to_value()?,
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    /// `index` of the step at `position`.
    pub fn step_index(&self, position: usize) -> Option<i64> {
        self.root["steps"][position]["index"].as_i64()
    }

    /// Write a field back after it was updated outside the document.
    pub fn sync_field(&mut self, at: FieldAt, field: &Field) -> Result<(), FormError> {
        let value = serde_json::to_value(field).map_err(crate::schema::SchemaError::from)?;
        write_path(&mut self.root, &at.field_path(), value)
            .map_err(|e| FormError::Model(e.to_string()))
    }

    /// Read the tree back.
    ///
    /// Expressions can write anything into the document; a tree that no
    /// longer reads as a schema is a `FormError::Model`.
    pub fn into_schema(mut self) -> Result<Schema, FormError> {
        normalize_aliases(&mut self.root);
        let schema: Schema =
            serde_json::from_value(self.root).map_err(|e| FormError::Model(e.to_string()))?;
        schema
            .validate()
            .map_err(|e| FormError::Model(e.to_string()))?;
        Ok(schema)
    }
}
