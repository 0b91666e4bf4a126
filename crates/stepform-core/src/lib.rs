//! # stepform-core
//!
//! Schema-driven multi-step form engine.
//!
//! A form schema describes ordered steps, each holding fields with values and
//! declarative rules. This crate:
//! - evaluates rule expressions against a field, its step and the whole form
//! - validates fields (`required`, length bounds, `valid_when` rules)
//! - applies `hidden_when` / `disabled_when` behaviors
//! - drives step navigation with optional per-step persistence
//!
//! ## Key Guarantees
//!
//! 1. **Sandboxed**: Rule expressions run in a restricted interpreter that
//!    can only reach the form document
//! 2. **Copy-on-write**: Updates return a new schema, or the same one when
//!    nothing changed
//! 3. **Traceable**: Every rule failure carries a pointer to the rule
//! 4. **Fail-fast**: Unknown fields and steps are errors, never no-ops
//!
//! ## Example
//!
//! ```rust,ignore
//! use stepform_core::{FormController, FormOptions, Schema, Transition};
//!
//! let schema = Schema::from_yaml_file("signup.yaml")?;
//! let mut form = FormController::new(schema, FormOptions::default());
//! form.on_model_change("name", "Ada".into())?;
//!
//! match form.next()? {
//!     Transition::Moved { path, .. } => println!("Go to {}", path),
//!     Transition::Invalid { fields } => println!("Fix: {:?}", fields),
//!     other => println!("{:?}", other),
//! }
//! ```

pub mod behavior;
pub mod controller;
pub mod expr;
pub mod pointer;
pub mod render;
pub mod rules;
pub mod schema;
pub mod scope;
pub mod step_model;
pub mod validator;

// Re-export main types at crate root
pub use behavior::BehaviorUpdater;
pub use controller::{
    Continuation, Direction, FormController, FormOptions, MessageVariant, NavigatorState,
    Notification, StepReport, Transition,
};
pub use expr::{ExprError, Program, ProgramCache};
pub use pointer::{RulePointer, RuleSet};
pub use render::{FieldRenderer, RenderMode, RenderedField, RendererRegistry};
pub use rules::{RuleEvaluator, RuleOutcome};
pub use schema::{Field, Rule, Schema, SchemaError, Step, ValidWhen};
pub use scope::{Document, FieldAt};
pub use validator::{FieldValidator, StepValidation};

use std::borrow::Cow;

use lazy_static::lazy_static;
use thiserror::Error;

lazy_static! {
    /// Evaluator shared by the free functions below.
    static ref SHARED_EVALUATOR: RuleEvaluator = RuleEvaluator::new();
}

/// Errors that can occur while driving a form
#[derive(Error, Debug)]
pub enum FormError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Rule {pointer} failed: {source}")]
    Rule {
        pointer: RulePointer,
        source: ExprError,
    },

    #[error("Field '{field}' not found in step {step}")]
    FieldNotFound { step: i64, field: String },

    #[error("Step not found: {0}")]
    StepNotFound(i64),

    #[error("Continuation does not match the pending save")]
    StaleContinuation,

    #[error("Form update produced an unreadable tree: {0}")]
    Model(String),
}

/// Apply `hidden_when` / `disabled_when` rules to step `index`.
///
/// # Arguments
///
/// * `schema` - The form
/// * `index` - `index` of the step to update
///
/// # Returns
///
/// The same schema when nothing changed, otherwise an updated copy.
pub fn update_behaviors(schema: &Schema, index: i64) -> Result<Cow<'_, Schema>, FormError> {
    BehaviorUpdater::new(&SHARED_EVALUATOR).update_behaviors(schema, index)
}

/// Validate every field of step `index`.
pub fn validate_step(schema: &Schema, index: i64) -> Result<StepValidation<'_>, FormError> {
    FieldValidator::new(&SHARED_EVALUATOR).validate_step(schema, index)
}
