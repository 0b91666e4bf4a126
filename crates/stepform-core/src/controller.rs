//! Form controller: navigation, callbacks and display state.
//!
//! The controller owns the schema for one form session. Moving between
//! steps validates the active step first; when a save handler is set the
//! move is deferred until the handler's [`Continuation`] is handed back
//! through [`FormController::complete`].

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::behavior::BehaviorUpdater;
use crate::expr::{value::truthy, Effect};
use crate::pointer::RulePointer;
use crate::rules::RuleEvaluator;
use crate::schema::{Field, Schema, SchemaError, Step};
use crate::scope::{Document, FieldAt};
use crate::step_model::{
    active_step_position, find_field_index, set_field_value, step_position, visible_steps,
};
use crate::validator::{FieldValidator, StepValidation};
use crate::FormError;

/// Controller options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FormOptions {
    /// Prefix of the navigation path; the step index is appended
    pub url_path_base: String,

    /// Call the save handler when moving back as well
    pub save_on_move_prior: bool,
}

impl FormOptions {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load options from a file, choosing the format by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&contents),
            _ => Self::from_json(&contents),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prior,
}

impl Direction {
    fn delta(self) -> i64 {
        match self {
            Direction::Next => 1,
            Direction::Prior => -1,
        }
    }
}

/// Token handed to the save handler; returning it completes the move.
///
/// It cannot be cloned, so a save can be completed at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct Continuation {
    ticket: u64,
    direction: Direction,
    step_index: i64,
}

impl Continuation {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// `index` of the step being saved.
    pub fn step_index(&self) -> i64 {
        self.step_index
    }
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// `activeStep` changed
    Moved { from: i64, to: i64, path: String },
    /// Waiting for the save handler's continuation
    Pending { direction: Direction },
    /// The active step has invalid fields
    Invalid { fields: Vec<String> },
    /// Next on the last step
    Finished,
    /// Prior on the first step
    Unavailable,
    /// A save is already pending
    Busy,
}

/// Validation result of the active step.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepReport {
    pub step: i64,
    pub valid: bool,
    pub invalid_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageVariant {
    #[default]
    None,
    Success,
    Warning,
    Error,
    Info,
}

impl MessageVariant {
    /// Parse a variant name; unknown names read as `Info`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" => MessageVariant::None,
            "success" => MessageVariant::Success,
            "warning" => MessageVariant::Warning,
            "error" => MessageVariant::Error,
            _ => MessageVariant::Info,
        }
    }
}

/// Snack-style message shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Notification {
    pub visible: bool,
    pub message: String,
    pub variant: MessageVariant,
}

/// Which navigation buttons are enabled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigatorState {
    pub prior_enabled: bool,
    pub cancel_enabled: bool,
    pub next_enabled: bool,
}

pub type SaveHandler = Box<dyn FnMut(&Step, &Schema, Continuation) + Send>;
pub type CancelHandler = Box<dyn FnMut(&Step, &Schema) + Send>;
pub type ModelChangeHandler = Box<dyn FnMut(&Schema) + Send>;
pub type NavigateHandler = Box<dyn FnMut(&str) + Send>;

#[derive(Debug)]
struct PendingSave {
    ticket: u64,
    direction: Direction,
}

/// Drives one form session.
pub struct FormController {
    schema: Schema,
    options: FormOptions,
    evaluator: RuleEvaluator,
    on_save_step: Option<SaveHandler>,
    on_cancel: Option<CancelHandler>,
    on_model_change: Option<ModelChangeHandler>,
    on_navigate: Option<NavigateHandler>,
    pending: Option<PendingSave>,
    next_ticket: u64,
    notification: Notification,
}

impl FormController {
    pub fn new(schema: Schema, options: FormOptions) -> Self {
        Self {
            schema,
            options,
            evaluator: RuleEvaluator::new(),
            on_save_step: None,
            on_cancel: None,
            on_model_change: None,
            on_navigate: None,
            pending: None,
            next_ticket: 1,
            notification: Notification::default(),
        }
    }

    /// Persist each step before moving on.
    pub fn with_save_handler(
        mut self,
        handler: impl FnMut(&Step, &Schema, Continuation) + Send + 'static,
    ) -> Self {
        self.on_save_step = Some(Box::new(handler));
        self
    }

    pub fn with_cancel_handler(
        mut self,
        handler: impl FnMut(&Step, &Schema) + Send + 'static,
    ) -> Self {
        self.on_cancel = Some(Box::new(handler));
        self
    }

    pub fn with_model_change_handler(
        mut self,
        handler: impl FnMut(&Schema) + Send + 'static,
    ) -> Self {
        self.on_model_change = Some(Box::new(handler));
        self
    }

    /// Receives the navigation path after every move.
    pub fn with_navigate_handler(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_navigate = Some(Box::new(handler));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn is_submitting(&self) -> bool {
        self.pending.is_some()
    }

    /// The step currently shown.
    pub fn active_step(&self) -> Option<&Step> {
        active_step_position(&self.schema).map(|position| &self.schema.steps[position])
    }

    pub fn navigator(&self) -> NavigatorState {
        let first_visible = visible_steps(&self.schema).first().map(|s| s.index);
        let on_first = self.active_step().map(|s| s.index) == first_visible;
        NavigatorState {
            prior_enabled: !on_first && !self.is_submitting(),
            cancel_enabled: true,
            next_enabled: !self.is_submitting(),
        }
    }

    /// Validate the active step once so alerts show before any input.
    pub fn mount(&mut self) -> Result<StepReport, FormError> {
        self.validate_active()
    }

    /// Validate the active step and record the alerts on its fields.
    pub fn validate_active(&mut self) -> Result<StepReport, FormError> {
        let (_, index) = self.active()?;
        let StepValidation {
            schema,
            valid,
            invalid_fields,
        } = FieldValidator::new(&self.evaluator).validate_step(&self.schema, index)?;
        if let Some(schema) = owned(schema) {
            self.schema = schema;
        }
        Ok(StepReport {
            step: index,
            valid,
            invalid_fields,
        })
    }

    /// Whether the active step is valid.
    pub fn is_model_valid(&mut self) -> Result<bool, FormError> {
        Ok(self.validate_active()?.valid)
    }

    /// Move to the next step.
    pub fn next(&mut self) -> Result<Transition, FormError> {
        self.navigate(Direction::Next, true)
    }

    /// Move to the prior step.
    pub fn prior(&mut self) -> Result<Transition, FormError> {
        let target = self.schema.active_step - 1;
        if self.pending.is_none() && step_position(&self.schema, target).is_none() {
            return Ok(Transition::Unavailable);
        }
        self.navigate(Direction::Prior, self.options.save_on_move_prior)
    }

    fn navigate(&mut self, direction: Direction, save: bool) -> Result<Transition, FormError> {
        if self.pending.is_some() {
            return Ok(Transition::Busy);
        }

        let report = self.validate_active()?;
        if !report.valid {
            tracing::debug!(
                step = report.step,
                fields = ?report.invalid_fields,
                "Navigation blocked by invalid fields"
            );
            return Ok(Transition::Invalid {
                fields: report.invalid_fields,
            });
        }

        if save && self.on_save_step.is_some() {
            let (position, index) = self.active()?;
            let continuation = self.begin_save(direction, index);
            if let Some(handler) = self.on_save_step.as_mut() {
                handler(&self.schema.steps[position], &self.schema, continuation);
            }
            return Ok(Transition::Pending { direction });
        }

        Ok(self.move_by(direction))
    }

    fn begin_save(&mut self, direction: Direction, step_index: i64) -> Continuation {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending = Some(PendingSave { ticket, direction });
        tracing::debug!(ticket, step = step_index, ?direction, "Save requested");
        Continuation {
            ticket,
            direction,
            step_index,
        }
    }

    fn take_pending(&mut self, continuation: &Continuation) -> Result<PendingSave, FormError> {
        let matches = self.pending.as_ref().is_some_and(|pending| {
            pending.ticket == continuation.ticket && pending.direction == continuation.direction
        });
        if !matches {
            return Err(FormError::StaleContinuation);
        }
        self.pending.take().ok_or(FormError::StaleContinuation)
    }

    /// Finish a pending save and perform the move it was holding.
    pub fn complete(&mut self, continuation: Continuation) -> Result<Transition, FormError> {
        let pending = self.take_pending(&continuation)?;
        Ok(self.move_by(pending.direction))
    }

    /// Drop a pending save without moving.
    pub fn abandon(&mut self, continuation: Continuation) -> Result<(), FormError> {
        self.take_pending(&continuation)?;
        tracing::debug!(step = continuation.step_index, "Save abandoned");
        Ok(())
    }

    fn move_by(&mut self, direction: Direction) -> Transition {
        let from = self.schema.active_step;
        let to = from + direction.delta();
        if step_position(&self.schema, to).is_none() {
            return match direction {
                Direction::Next => Transition::Finished,
                Direction::Prior => Transition::Unavailable,
            };
        }

        self.schema.active_step = to;
        let path = format!("{}{}", self.options.url_path_base, to);
        if let Some(handler) = self.on_navigate.as_mut() {
            handler(&path);
        }
        tracing::info!(from, to, path = %path, "Moved to step");
        Transition::Moved { from, to, path }
    }

    /// Hand the active step to the cancel handler.
    pub fn cancel(&mut self) -> Result<(), FormError> {
        let (position, _) = self.active()?;
        if let Some(handler) = self.on_cancel.as_mut() {
            handler(&self.schema.steps[position], &self.schema);
        }
        Ok(())
    }

    /// Re-apply field behaviors, then re-validate the active step.
    pub fn blur(&mut self) -> Result<StepReport, FormError> {
        let (_, index) = self.active()?;
        let updated = BehaviorUpdater::new(&self.evaluator).update_behaviors(&self.schema, index)?;
        if let Some(schema) = owned(updated) {
            self.schema = schema;
        }
        self.validate_active()
    }

    /// Set a field's value on the active step and run its `on_change`.
    pub fn on_model_change(&mut self, id: &str, value: Value) -> Result<(), FormError> {
        let (position, index) = self.active()?;
        set_field_value(&mut self.schema.steps[position], id, value)?;

        if let Some(handler) = self.on_model_change.as_mut() {
            handler(&self.schema);
        }

        let field_position = find_field_index(&self.schema.steps[position], id).ok_or_else(|| {
            FormError::FieldNotFound {
                step: index,
                field: id.to_string(),
            }
        })?;
        let Some(body) = self.schema.steps[position].fields[field_position]
            .on_change
            .clone()
        else {
            return Ok(());
        };

        let mut document = Document::new(&self.schema)?;
        let (effects, dirty) = self
            .evaluator
            .run_on_change(&body, &mut document, FieldAt::new(position, field_position))
            .map_err(|source| FormError::Rule {
                pointer: RulePointer::on_change(index, id),
                source,
            })?;
        if dirty {
            self.schema = document.into_schema()?;
        }
        for effect in effects {
            self.apply_effect(effect)?;
        }
        Ok(())
    }

    fn apply_effect(&mut self, effect: Effect) -> Result<(), FormError> {
        match effect {
            Effect::ShowMessage { message, variant } => {
                self.show_message(message, MessageVariant::parse(&variant));
                Ok(())
            }
            Effect::SetNewState(record) => self.set_new_state(&record),
        }
    }

    /// Fill the active step's fields from a record keyed by field id.
    ///
    /// Fields missing from the record, or whose entry is falsy (`0`, `false`,
    /// `""`, `null`), are cleared to `""`. An `id` field is added
    /// when the record has one and the step does not.
    pub fn set_new_state(&mut self, record: &Value) -> Result<(), FormError> {
        let (position, _) = self.active()?;
        let step = &mut self.schema.steps[position];
        for field in step.fields.iter_mut() {
            field.value = match record.get(&field.id) {
                Some(value) if truthy(value) => value.clone(),
                _ => Value::String(String::new()),
            };
        }

        let has_id_field = step.fields.iter().any(|f| f.id.eq_ignore_ascii_case("id"));
        if let Some(id) = record.get("id").filter(|id| truthy(id)) {
            if !has_id_field {
                step.fields.push(Field {
                    value: id.clone(),
                    ..Field::new("id")
                });
            }
        }
        Ok(())
    }

    pub fn show_message(&mut self, message: impl Into<String>, variant: MessageVariant) {
        self.notification = Notification {
            visible: true,
            message: message.into(),
            variant,
        };
    }

    pub fn close_message(&mut self) {
        self.notification = Notification::default();
    }

    /// Position and `index` of the active step.
    fn active(&self) -> Result<(usize, i64), FormError> {
        active_step_position(&self.schema)
            .map(|position| (position, self.schema.steps[position].index))
            .ok_or(FormError::StepNotFound(self.schema.active_step))
    }
}

fn owned(schema: Cow<'_, Schema>) -> Option<Schema> {
    match schema {
        Cow::Owned(schema) => Some(schema),
        Cow::Borrowed(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn three_steps() -> Schema {
        Schema::from_value(json!({
            "activeStep": 0,
            "steps": [
                { "index": 0, "fields": [{ "id": "name", "required": true, "value": "" }] },
                { "index": 1, "fields": [
                    { "id": "qty", "value": 0, "on_change": "field.value > 10 && (stepFlow.fields[1].disabled = true)" },
                    { "id": "notes", "value": "" }
                ] },
                { "index": 2, "fields": [] },
                { "index": 9, "modal": true, "fields": [] }
            ]
        }))
        .unwrap()
    }

    fn options() -> FormOptions {
        FormOptions {
            url_path_base: "/signup/".to_string(),
            save_on_move_prior: false,
        }
    }

    #[test]
    fn test_mount_shows_required_alerts() {
        let mut controller = FormController::new(three_steps(), options());
        let report = controller.mount().unwrap();
        assert!(!report.valid);
        assert_eq!(report.invalid_fields, vec!["name".to_string()]);
        assert_eq!(
            controller.schema().steps[0].fields[0].alert(),
            Some("Required *")
        );
    }

    #[test]
    fn test_next_blocked_by_invalid_step() {
        let mut controller = FormController::new(three_steps(), options());
        assert_eq!(
            controller.next().unwrap(),
            Transition::Invalid {
                fields: vec!["name".to_string()]
            }
        );
        assert_eq!(controller.schema().active_step, 0);
    }

    #[test]
    fn test_next_without_save_handler_moves_by_one() {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&paths);
        let mut controller = FormController::new(three_steps(), options())
            .with_navigate_handler(move |path| sink.lock().unwrap().push(path.to_string()));
        controller.on_model_change("name", json!("Ada")).unwrap();
        let before = controller.schema().clone();

        let transition = controller.next().unwrap();
        assert_eq!(
            transition,
            Transition::Moved {
                from: 0,
                to: 1,
                path: "/signup/1".to_string()
            }
        );
        assert_eq!(controller.schema().active_step, 1);
        assert_eq!(controller.schema().steps[1..], before.steps[1..]);
        assert_eq!(*paths.lock().unwrap(), vec!["/signup/1".to_string()]);
    }

    #[test]
    fn test_save_handler_defers_move_until_complete() {
        let continuations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&continuations);
        let mut controller = FormController::new(three_steps(), options())
            .with_save_handler(move |step, _state, continuation| {
                assert_eq!(step.index, 0);
                sink.lock().unwrap().push(continuation);
            });
        controller.on_model_change("name", json!("Ada")).unwrap();

        assert_eq!(
            controller.next().unwrap(),
            Transition::Pending {
                direction: Direction::Next
            }
        );
        assert!(controller.is_submitting());
        assert!(!controller.navigator().next_enabled);
        assert_eq!(controller.next().unwrap(), Transition::Busy);
        assert_eq!(controller.schema().active_step, 0);

        let continuation = continuations.lock().unwrap().pop().unwrap();
        assert_eq!(continuation.step_index(), 0);
        let transition = controller.complete(continuation).unwrap();
        assert!(matches!(transition, Transition::Moved { to: 1, .. }));
        assert!(!controller.is_submitting());
    }

    #[test]
    fn test_stale_continuation_rejected() {
        let continuations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&continuations);
        let mut controller = FormController::new(three_steps(), options())
            .with_save_handler(move |_, _, continuation| sink.lock().unwrap().push(continuation));
        controller.on_model_change("name", json!("Ada")).unwrap();

        controller.next().unwrap();
        let first = continuations.lock().unwrap().pop().unwrap();
        controller.abandon(first).unwrap();
        assert!(!controller.is_submitting());

        controller.next().unwrap();
        let forged = Continuation {
            ticket: 1,
            direction: Direction::Next,
            step_index: 0,
        };
        assert!(matches!(
            controller.complete(forged),
            Err(FormError::StaleContinuation)
        ));
        assert!(controller.is_submitting());
    }

    #[test]
    fn test_prior_skips_save_unless_configured() {
        let saves = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&saves);
        let mut schema = three_steps();
        schema.active_step = 2;
        let mut controller = FormController::new(schema, options())
            .with_save_handler(move |_, _, _| *counter.lock().unwrap() += 1);

        assert!(matches!(
            controller.prior().unwrap(),
            Transition::Moved { from: 2, to: 1, .. }
        ));
        assert_eq!(*saves.lock().unwrap(), 0);
    }

    #[test]
    fn test_prior_with_save_on_move_prior() {
        let mut schema = three_steps();
        schema.active_step = 2;
        let mut controller = FormController::new(
            schema,
            FormOptions {
                save_on_move_prior: true,
                ..options()
            },
        )
        .with_save_handler(|_, _, _| {});
        assert_eq!(
            controller.prior().unwrap(),
            Transition::Pending {
                direction: Direction::Prior
            }
        );
    }

    #[test]
    fn test_prior_on_first_step_is_unavailable() {
        let mut controller = FormController::new(three_steps(), options());
        assert_eq!(controller.prior().unwrap(), Transition::Unavailable);
        assert!(!controller.navigator().prior_enabled);
    }

    #[test]
    fn test_next_on_last_step_finishes() {
        let mut schema = three_steps();
        schema.active_step = 2;
        let mut controller = FormController::new(schema, options());
        assert_eq!(controller.next().unwrap(), Transition::Finished);
        assert_eq!(controller.schema().active_step, 2);
        assert!(controller.navigator().prior_enabled);
    }

    #[test]
    fn test_on_change_disables_sibling() {
        let mut schema = three_steps();
        schema.active_step = 1;
        let changes = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&changes);
        let mut controller = FormController::new(schema, options())
            .with_model_change_handler(move |_| *counter.lock().unwrap() += 1);

        controller.on_model_change("qty", json!(5)).unwrap();
        assert!(!controller.schema().steps[1].fields[1].disabled);

        controller.on_model_change("qty", json!(11)).unwrap();
        assert!(controller.schema().steps[1].fields[1].disabled);
        assert_eq!(controller.schema().steps[1].fields[0].value, json!(11));
        assert_eq!(*changes.lock().unwrap(), 2);
    }

    #[test]
    fn test_on_model_change_unknown_field_fails_fast() {
        let mut controller = FormController::new(three_steps(), options());
        assert!(matches!(
            controller.on_model_change("nope", json!(1)),
            Err(FormError::FieldNotFound { step: 0, .. })
        ));
    }

    #[test]
    fn test_on_change_effects() {
        let schema = Schema::from_value(json!({
            "activeStep": 0,
            "steps": [{
                "index": 0,
                "fields": [{
                    "id": "customer",
                    "on_change": "self.showSnackMessage('Loaded ' + field.value, 'success')"
                }]
            }]
        }))
        .unwrap();
        let mut controller = FormController::new(schema, options());
        controller.on_model_change("customer", json!("c-1")).unwrap();
        assert_eq!(
            controller.notification(),
            &Notification {
                visible: true,
                message: "Loaded c-1".to_string(),
                variant: MessageVariant::Success
            }
        );
        controller.close_message();
        assert_eq!(controller.notification(), &Notification::default());
    }

    #[test]
    fn test_set_new_state_fills_fields_and_adds_id() {
        let schema = Schema::from_value(json!({
            "activeStep": 0,
            "steps": [{ "index": 0, "fields": [{ "id": "name", "value": "old" }, { "id": "city", "value": "x" }] }]
        }))
        .unwrap();
        let mut controller = FormController::new(schema, options());
        controller
            .set_new_state(&json!({ "id": 42, "name": "Ada" }))
            .unwrap();
        let fields = &controller.schema().steps[0].fields;
        assert_eq!(fields[0].value, json!("Ada"));
        assert_eq!(fields[1].value, json!(""));
        assert_eq!(fields[2].id, "id");
        assert_eq!(fields[2].value, json!(42));

        controller.set_new_state(&json!({ "id": 43 })).unwrap();
        let fields = &controller.schema().steps[0].fields;
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].value, json!(43));
    }

    #[test]
    fn test_set_new_state_clears_falsy_members() {
        let schema = Schema::from_value(json!({
            "activeStep": 0,
            "steps": [{ "index": 0, "fields": [
                { "id": "qty", "value": 5 },
                { "id": "agreed", "value": true },
                { "id": "notes", "value": "n" },
                { "id": "code", "value": "c" }
            ] }]
        }))
        .unwrap();
        let mut controller = FormController::new(schema, options());
        controller
            .set_new_state(&json!({ "qty": 0, "agreed": false, "notes": null, "code": "A1" }))
            .unwrap();
        let fields = &controller.schema().steps[0].fields;
        assert_eq!(fields[0].value, json!(""));
        assert_eq!(fields[1].value, json!(""));
        assert_eq!(fields[2].value, json!(""));
        assert_eq!(fields[3].value, json!("A1"));
    }

    #[test]
    fn test_blur_applies_behaviors_then_validates() {
        let schema = Schema::from_value(json!({
            "activeStep": 0,
            "steps": [{
                "index": 0,
                "fields": [
                    { "id": "kind", "value": "X", "hidden_when": [{ "test": "fieldValue == 'X'", "message": "" }] },
                    { "id": "code", "value": "ab", "minLength": 3, "maxLength": 10 }
                ]
            }]
        }))
        .unwrap();
        let mut controller = FormController::new(schema, options());
        let report = controller.blur().unwrap();
        let fields = &controller.schema().steps[0].fields;
        assert!(fields[0].hidden);
        assert_eq!(fields[0].value, json!(""));
        assert!(!report.valid);
        assert_eq!(report.invalid_fields, vec!["code".to_string()]);
    }

    #[test]
    fn test_cancel_receives_active_step() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut schema = three_steps();
        schema.active_step = 1;
        let mut controller = FormController::new(schema, options())
            .with_cancel_handler(move |step, _| *sink.lock().unwrap() = Some(step.index));
        controller.cancel().unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(1));
        assert_eq!(controller.schema().active_step, 1);
    }

    #[test]
    fn test_missing_active_step() {
        let mut schema = three_steps();
        schema.active_step = 5;
        let mut controller = FormController::new(schema, options());
        assert!(matches!(controller.next(), Err(FormError::StepNotFound(5))));
    }

    #[test]
    fn test_options_from_yaml() {
        let options = FormOptions::from_yaml("url_path_base: /wizard/\n").unwrap();
        assert_eq!(options.url_path_base, "/wizard/");
        assert!(!options.save_on_move_prior);
    }

    #[test]
    fn test_message_variant_parse() {
        assert_eq!(MessageVariant::parse("Warning"), MessageVariant::Warning);
        assert_eq!(MessageVariant::parse("shiny"), MessageVariant::Info);
    }
}
