//! Field behavior updates (`hidden_when`, `disabled_when`).
//!
//! Rules of a list run in order and each one is applied before the next is
//! evaluated: a truthy `hidden_when` rule hides the field and clears its
//! value, a falsy one shows it again without restoring the value. The last
//! rule therefore decides the flag. Fields are processed in order and each
//! sees the updates already applied to the fields before it.

use std::borrow::Cow;

use serde_json::Value;

use crate::pointer::{RulePointer, RuleSet};
use crate::rules::RuleEvaluator;
use crate::schema::{Field, Rule, Schema};
use crate::scope::{Document, FieldAt};
use crate::step_model::{replace_fields, step_position};
use crate::FormError;

/// Applies visibility and disablement rules across a step.
pub struct BehaviorUpdater<'e> {
    evaluator: &'e RuleEvaluator,
}

impl<'e> BehaviorUpdater<'e> {
    pub fn new(evaluator: &'e RuleEvaluator) -> Self {
        Self { evaluator }
    }

    /// Update the fields of step `index`.
    ///
    /// # Returns
    ///
    /// * `Cow::Borrowed` - No field changed
    /// * `Cow::Owned` - A copy of the schema with the step updated
    pub fn update_behaviors<'a>(
        &self,
        schema: &'a Schema,
        index: i64,
    ) -> Result<Cow<'a, Schema>, FormError> {
        let position = step_position(schema, index).ok_or(FormError::StepNotFound(index))?;
        let mut document = Document::new(schema)?;
        let mut fields = schema.steps[position].fields.clone();
        let mut changed = false;

        for (i, field) in fields.iter_mut().enumerate() {
            let at = FieldAt::new(position, i);
            let original = field.clone();
            self.run_rules(RuleSet::HiddenWhen, field, &mut document, at, index)?;
            self.run_rules(RuleSet::DisabledWhen, field, &mut document, at, index)?;
            changed |= *field != original;
        }

        if changed {
            tracing::debug!(step = index, "Field behaviors updated");
            Ok(Cow::Owned(replace_fields(schema, position, fields)))
        } else {
            Ok(Cow::Borrowed(schema))
        }
    }

    /// Evaluate each rule of `set` and apply its outcome to `field` and the
    /// document before the next rule runs.
    fn run_rules(
        &self,
        set: RuleSet,
        field: &mut Field,
        document: &mut Document,
        at: FieldAt,
        step_index: i64,
    ) -> Result<(), FormError> {
        let rules: Vec<Rule> = match set {
            RuleSet::HiddenWhen => field.hidden_when.clone(),
            RuleSet::DisabledWhen => field.disabled_when.clone(),
            RuleSet::ValidWhen | RuleSet::OnChange => return Ok(()),
        };

        for (position, rule) in rules.iter().enumerate() {
            let outcome = self
                .evaluator
                .evaluate(rule, document, at)
                .map_err(|source| FormError::Rule {
                    pointer: RulePointer::rule(step_index, field.id.as_str(), set, position),
                    source,
                })?;

            let mut updated = field.clone();
            match set {
                RuleSet::HiddenWhen => {
                    updated.hidden = outcome.result;
                    if outcome.result {
                        updated.value = Value::String(String::new());
                    }
                }
                _ => updated.disabled = outcome.result,
            }
            if updated != *field {
                document.sync_field(at, &updated)?;
                *field = updated;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn step_schema(fields: Value) -> Schema {
        Schema::from_value(json!({
            "activeStep": 0,
            "steps": [
                { "index": 0, "fields": fields },
                { "index": 1, "fields": [{ "id": "untouched", "value": "keep" }] }
            ]
        }))
        .unwrap()
    }

    fn update(schema: &Schema) -> Cow<'_, Schema> {
        let evaluator = RuleEvaluator::new();
        BehaviorUpdater::new(&evaluator)
            .update_behaviors(schema, 0)
            .unwrap()
    }

    #[test]
    fn test_hide_clears_value() {
        let schema = step_schema(json!([{
            "id": "kind",
            "value": "X",
            "hidden_when": [{ "test": "fieldValue == 'X'", "message": "" }]
        }]));
        let updated = update(&schema);
        let field = &updated.steps[0].fields[0];
        assert!(field.hidden);
        assert_eq!(field.value, json!(""));
        assert_eq!(updated.steps[1], schema.steps[1]);
    }

    #[test]
    fn test_last_rule_decides_flag_but_value_stays_cleared() {
        let schema = step_schema(json!([{
            "id": "a",
            "value": "v",
            "hidden": true,
            "hidden_when": [
                { "test": "true", "message": "" },
                { "test": "false", "message": "" }
            ]
        }]));
        let updated = update(&schema);
        assert!(!updated.steps[0].fields[0].hidden);
        assert_eq!(updated.steps[0].fields[0].value, json!(""));
    }

    #[test]
    fn test_later_rules_see_earlier_rule_effects() {
        let schema = step_schema(json!([{
            "id": "a",
            "value": "X",
            "hidden_when": [
                { "test": "fieldValue == 'X'", "message": "" },
                { "test": "fieldValue === '' && stepFlow.fields[0].hidden", "message": "" }
            ]
        }]));
        let updated = update(&schema);
        let field = &updated.steps[0].fields[0];
        assert!(field.hidden);
        assert_eq!(field.value, json!(""));
    }

    #[test]
    fn test_falsy_rule_after_truthy_one_shows_field() {
        let schema = step_schema(json!([{
            "id": "a",
            "value": "X",
            "hidden_when": [
                { "test": "fieldValue == 'X'", "message": "" },
                { "test": "fieldValue == 'X'", "message": "" }
            ]
        }]));
        let updated = update(&schema);
        let field = &updated.steps[0].fields[0];
        assert!(!field.hidden);
        assert_eq!(field.value, json!(""));
    }

    #[test]
    fn test_disable_rules_apply_in_order() {
        let schema = step_schema(json!([{
            "id": "a",
            "value": "v",
            "disabled_when": [
                { "test": "true", "message": "" },
                { "test": "!stepFlow.fields[0].disabled", "message": "" }
            ]
        }]));
        let updated = update(&schema);
        let field = &updated.steps[0].fields[0];
        assert!(!field.disabled);
        assert_eq!(field.value, json!("v"));
    }

    #[test]
    fn test_all_rules_are_evaluated() {
        let schema = step_schema(json!([{
            "id": "a",
            "hidden_when": [
                { "test": "true", "message": "" },
                { "test": "broken(", "message": "" }
            ]
        }]));
        let evaluator = RuleEvaluator::new();
        let err = BehaviorUpdater::new(&evaluator)
            .update_behaviors(&schema, 0)
            .unwrap_err();
        match err {
            FormError::Rule { pointer, .. } => {
                assert_eq!(pointer.to_string(), "steps[0].fields[a].hidden_when[1]")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_disable_from_other_field() {
        let schema = step_schema(json!([
            { "id": "qty", "value": 12 },
            {
                "id": "notes",
                "value": "text",
                "disabled_when": [{ "test": "stepFlow.fields[0].value > 10", "message": "" }]
            }
        ]));
        let updated = update(&schema);
        let notes = &updated.steps[0].fields[1];
        assert!(notes.disabled);
        assert_eq!(notes.value, json!("text"));
    }

    #[test]
    fn test_fields_without_rules_keep_flags() {
        let schema = step_schema(json!([{ "id": "a", "hidden": true, "disabled": true, "value": "" }]));
        let updated = update(&schema);
        assert!(matches!(updated, Cow::Borrowed(_)));
        assert!(updated.steps[0].fields[0].hidden);
    }

    #[test]
    fn test_later_fields_see_earlier_updates() {
        let schema = step_schema(json!([
            {
                "id": "first",
                "value": "X",
                "hidden_when": [{ "test": "fieldValue == 'X'", "message": "" }]
            },
            {
                "id": "second",
                "hidden_when": [{ "test": "stepFlow.fields[0].hidden", "message": "" }]
            }
        ]));
        let updated = update(&schema);
        assert!(updated.steps[0].fields[1].hidden);
    }

    #[test]
    fn test_disabled_rules_see_cleared_value() {
        let schema = step_schema(json!([{
            "id": "a",
            "value": "X",
            "hidden_when": [{ "test": "fieldValue == 'X'", "message": "" }],
            "disabled_when": [{ "test": "fieldValue === ''", "message": "" }]
        }]));
        let updated = update(&schema);
        assert!(updated.steps[0].fields[0].disabled);
    }

    #[test]
    fn test_unknown_step() {
        let schema = step_schema(json!([]));
        let evaluator = RuleEvaluator::new();
        assert!(matches!(
            BehaviorUpdater::new(&evaluator).update_behaviors(&schema, 7),
            Err(FormError::StepNotFound(7))
        ));
    }

    proptest! {
        #[test]
        fn prop_second_pass_is_a_fixed_point(
            kind in prop::sample::select(vec!["X", "Y", ""]),
            hidden in any::<bool>(),
            disabled in any::<bool>(),
            value in "[a-z]{0,4}",
        ) {
            let schema = step_schema(json!([
                { "id": "kind", "value": kind },
                {
                    "id": "target",
                    "value": value,
                    "hidden": hidden,
                    "disabled": disabled,
                    "hidden_when": [{ "test": "stepFlow.fields[0].value == 'X'", "message": "" }],
                    "disabled_when": [
                        { "test": "stepFlow.fields[0].value == 'Y'", "message": "" },
                        { "test": "stepFlow.fields[0].value === ''", "message": "" }
                    ]
                }
            ]));
            let evaluator = RuleEvaluator::new();
            let updater = BehaviorUpdater::new(&evaluator);
            let settled = updater.update_behaviors(&schema, 0).unwrap().into_owned();
            let again = updater.update_behaviors(&settled, 0).unwrap();
            prop_assert!(matches!(again, Cow::Borrowed(_)));
        }

        #[test]
        fn prop_earlier_hide_clears_value_for_later_rules(
            kind in prop::sample::select(vec!["X", "Y"]),
            value in "[a-z]{1,4}",
        ) {
            let schema = step_schema(json!([{
                "id": "kind",
                "value": kind,
                "hidden_when": [{ "test": "true", "message": "" }, { "test": "fieldValue == 'X'", "message": "" }]
            }, { "id": "other", "value": value.clone() }]));
            let evaluator = RuleEvaluator::new();
            let updated = BehaviorUpdater::new(&evaluator).update_behaviors(&schema, 0).unwrap();
            let field = &updated.steps[0].fields[0];
            // The first rule clears the value, so the second never matches.
            prop_assert!(!field.hidden);
            prop_assert_eq!(&field.value, &json!(""));
            prop_assert_eq!(&updated.steps[0].fields[1].value, &json!(value));
        }
    }
}
