//! Pointers to the rule that produced an outcome or an error.
//!
//! Every expression failure is reported with the location of the rule in
//! the schema, so a broken rule can be found without re-running the form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which rule list of a field a rule belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    HiddenWhen,
    DisabledWhen,
    ValidWhen,
    OnChange,
}

impl RuleSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSet::HiddenWhen => "hidden_when",
            RuleSet::DisabledWhen => "disabled_when",
            RuleSet::ValidWhen => "valid_when",
            RuleSet::OnChange => "on_change",
        }
    }
}

/// Location of a rule (e.g., "steps[1].fields[name].valid_when[0]").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RulePointer {
    /// `index` of the step
    pub step: i64,

    /// `id` of the field
    pub field: String,

    pub set: RuleSet,

    /// Position in the rule list; `None` for `on_change`
    pub position: Option<usize>,
}

impl RulePointer {
    /// Point at a rule in one of the field's rule lists.
    pub fn rule(step: i64, field: impl Into<String>, set: RuleSet, position: usize) -> Self {
        Self {
            step,
            field: field.into(),
            set,
            position: Some(position),
        }
    }

    /// Point at a field's `on_change` hook.
    pub fn on_change(step: i64, field: impl Into<String>) -> Self {
        Self {
            step,
            field: field.into(),
            set: RuleSet::OnChange,
            position: None,
        }
    }
}

impl fmt::Display for RulePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "steps[{}].fields[{}].{}",
            self.step,
            self.field,
            self.set.as_str()
        )?;
        if let Some(position) = self.position {
            write!(f, "[{}]", position)?;
        }
        Ok(())
    }
}
