//! Form schema types and loaders.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::structure::validate_form_document;
use super::SchemaError;

/// A declarative rule attached to a field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Rule {
    /// Expression body evaluated against `fieldValue`, `stepFlow`, `schemaFlow`
    #[serde(default)]
    pub test: Option<String>,

    /// Message surfaced when the rule's result is truthy
    #[serde(default, deserialize_with = "lenient::text")]
    pub message: String,
}

impl Rule {
    pub fn new(test: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test: Some(test.into()),
            message: message.into(),
        }
    }
}

/// Validity rules of a field together with the alert they last produced.
///
/// Accepts either a bare rule list or the full record on input.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ValidWhen {
    pub rules: Vec<Rule>,

    #[serde(rename = "showAlertMessage")]
    pub show_alert_message: bool,

    pub alert: String,
}

impl ValidWhen {
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    pub fn is_failing(&self) -> bool {
        self.show_alert_message
    }
}

impl<'de> Deserialize<'de> for ValidWhen {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Record {
            #[serde(default)]
            rules: Vec<Rule>,
            #[serde(rename = "showAlertMessage", default, deserialize_with = "lenient::flag")]
            show_alert_message: bool,
            #[serde(default, deserialize_with = "lenient::text")]
            alert: String,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Rules(Vec<Rule>),
            Record(Record),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::Rules(rules) => ValidWhen::from_rules(rules),
            Shape::Record(record) => ValidWhen {
                rules: record.rules,
                show_alert_message: record.show_alert_message,
                alert: record.alert,
            },
        })
    }
}

/// A single input of a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Field {
    /// Identifier, unique within the step
    pub id: String,

    /// Renderer lookup key
    #[serde(rename = "elementName", default, skip_serializing_if = "Option::is_none")]
    pub element_name: Option<String>,

    /// Current value (any JSON value)
    #[serde(default)]
    pub value: Value,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub required: bool,

    #[serde(
        rename = "minLength",
        default,
        deserialize_with = "lenient::length_bound",
        skip_serializing_if = "Option::is_none"
    )]
    pub min_length: Option<usize>,

    #[serde(
        rename = "maxLength",
        default,
        deserialize_with = "lenient::length_bound",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_length: Option<usize>,

    #[serde(default, alias = "hide", deserialize_with = "lenient::flag")]
    pub hidden: bool,

    #[serde(default, deserialize_with = "lenient::flag")]
    pub disabled: bool,

    /// Visibility rules, applied in order; the last one decides the flag
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_when: Vec<Rule>,

    /// Disablement rules, applied in order; the last one decides the flag
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_when: Vec<Rule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_when: Option<ValidWhen>,

    /// Expression run after the value changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_change: Option<String>,

    /// Renderer attributes (`label`, `size`, `name`, ...) kept verbatim
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Field {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Look up a renderer attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// The field's value as label text.
    ///
    /// Objects show their `label` member; empty values show `N/A`.
    pub fn display_value(&self) -> String {
        const EMPTY: &str = "N/A";

        match &self.value {
            Value::Null => EMPTY.to_string(),
            Value::String(s) if s.trim().is_empty() => EMPTY.to_string(),
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("label") {
                Some(Value::String(label)) if !label.is_empty() => label.clone(),
                Some(Value::String(_) | Value::Null) | None => EMPTY.to_string(),
                Some(other) => crate::expr::value::to_display(other),
            },
            Value::Array(items) if items.is_empty() => EMPTY.to_string(),
            other => crate::expr::value::to_display(other),
        }
    }

    /// Current alert, if the last validation failed.
    pub fn alert(&self) -> Option<&str> {
        self.valid_when
            .as_ref()
            .filter(|v| v.show_alert_message)
            .map(|v| v.alert.as_str())
    }
}

/// One page of the form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Step {
    /// Stable identifier; not the position in `steps`
    pub index: i64,

    #[serde(rename = "flowTitle", default, skip_serializing_if = "Option::is_none")]
    pub flow_title: Option<String>,

    #[serde(rename = "flowDescription", default, skip_serializing_if = "Option::is_none")]
    pub flow_description: Option<String>,

    /// Modal steps are not part of the linear sequence
    #[serde(default, alias = "isModal", deserialize_with = "lenient::flag")]
    pub modal: bool,

    #[serde(default)]
    pub fields: Vec<Field>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Step {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }
}

/// A multi-step form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Schema {
    /// `index` of the step currently shown
    #[serde(rename = "activeStep", default)]
    pub active_step: i64,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(rename = "flowTitle", default, skip_serializing_if = "Option::is_none")]
    pub flow_title: Option<String>,

    #[serde(rename = "flowDescription", default, skip_serializing_if = "Option::is_none")]
    pub flow_description: Option<String>,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Schema {
    /// Parse a schema from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a schema from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a schema from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a schema from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a schema file, choosing the format by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Self::from_value(Self::read_document(path)?)
    }

    /// Read a schema file into a raw document without checking its shape.
    ///
    /// `.yaml` and `.yml` files are read as YAML, anything else as JSON.
    /// Field aliases are already normalized.
    pub fn read_document(path: impl AsRef<Path>) -> Result<Value, SchemaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut value: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        normalize_aliases(&mut value);
        Ok(value)
    }

    /// Build a schema from an already parsed document.
    ///
    /// The document is checked structurally, deserialized, then checked for
    /// duplicate identifiers.
    pub fn from_value(mut value: Value) -> Result<Self, SchemaError> {
        normalize_aliases(&mut value);
        validate_form_document(&value)?;
        let schema: Schema = serde_json::from_value(value)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Serialize into a JSON document.
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Validate identifiers.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut step_indexes = HashSet::new();
        for (position, step) in self.steps.iter().enumerate() {
            if !step_indexes.insert(step.index) {
                return Err(SchemaError::DuplicateStep(step.index));
            }

            let mut ids = HashSet::new();
            for (field_position, field) in step.fields.iter().enumerate() {
                if field.id.is_empty() {
                    return Err(SchemaError::MissingField(format!(
                        "steps[{}].fields[{}].id",
                        position, field_position
                    )));
                }
                if !ids.insert(field.id.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        step: step.index,
                        field: field.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Fold alternate spellings (`hide`, `isModal`) into their canonical keys.
///
/// Expressions may write either spelling; both present at once would be a
/// duplicate field for serde, and the alternate one is always the newer.
pub(crate) fn normalize_aliases(document: &mut Value) {
    let Some(steps) = document.get_mut("steps").and_then(Value::as_array_mut) else {
        return;
    };
    for step in steps {
        let Some(step) = step.as_object_mut() else {
            continue;
        };
        if let Some(modal) = step.remove("isModal") {
            step.insert("modal".to_string(), modal);
        }
        let Some(fields) = step.get_mut("fields").and_then(Value::as_array_mut) else {
            continue;
        };
        for field in fields.iter_mut().filter_map(Value::as_object_mut) {
            if let Some(hide) = field.remove("hide") {
                field.insert("hidden".to_string(), hide);
            }
        }
    }
}

/// Deserializers that accept the loose values web-authored schemas contain.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use crate::expr::value::{to_display, truthy};

    /// Any value, read by truthiness.
    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(truthy(&Value::deserialize(deserializer)?))
    }

    /// A non-negative integer, a numeric string, or nothing.
    pub fn length_bound<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| serde::de::Error::custom(format!("invalid length bound {}", n))),
            Value::String(s) => s
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid length bound '{}'", s))),
            other => Err(serde::de::Error::custom(format!(
                "invalid length bound {}",
                other
            ))),
        }
    }

    /// A string; `null` reads as empty and scalars are stringified.
    pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => String::new(),
            other => to_display(&other),
        })
    }
}
