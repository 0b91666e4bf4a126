//! Rule evaluation.
//!
//! A rule's `test` is a function body over three bindings:
//! - `fieldValue`: the value of the field the rule belongs to
//! - `stepFlow`: the step holding the field
//! - `schemaFlow`: the whole form
//!
//! Tests that do not contain `return` are treated as a single expression.
//! Rules cannot modify the form; `on_change` hooks can.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expr::{value::truthy, Effect, Env, ExprError, ProgramCache};
use crate::schema::Rule;
use crate::scope::{Document, FieldAt};

/// Message reported for a rule without a `test`.
pub const MISSING_TEST_MESSAGE: &str =
    "The rule doesn't contain the required properties to be validated.";

/// Result of evaluating one rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleOutcome {
    /// Truthiness of the test's result
    pub result: bool,

    /// The rule's message when `result` is true, otherwise empty
    pub message: String,
}

impl RuleOutcome {
    fn missing_test() -> Self {
        Self {
            result: false,
            message: MISSING_TEST_MESSAGE.to_string(),
        }
    }
}

/// Evaluates rule tests and `on_change` hooks, caching compiled programs.
#[derive(Debug, Default)]
pub struct RuleEvaluator {
    cache: ProgramCache,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a rule for the field at `at`.
    ///
    /// # Returns
    ///
    /// * `Ok(RuleOutcome)` - `result` is the truthiness of the test
    /// * `Err(ExprError)` - The test failed to compile or run
    pub fn evaluate(
        &self,
        rule: &Rule,
        document: &Document,
        at: FieldAt,
    ) -> Result<RuleOutcome, ExprError> {
        let Some(test) = rule.test.as_deref() else {
            tracing::warn!(
                step = at.step,
                field = at.field,
                "Rule has no test, treating it as not matched"
            );
            return Ok(RuleOutcome::missing_test());
        };

        let value = self.evaluate_expression(test, document, at)?;
        let result = truthy(&value);
        tracing::debug!(test, result, "Rule evaluated");

        Ok(RuleOutcome {
            result,
            message: if result {
                rule.message.clone()
            } else {
                String::new()
            },
        })
    }

    /// Evaluate a test and return its raw value.
    pub fn evaluate_expression(
        &self,
        test: &str,
        document: &Document,
        at: FieldAt,
    ) -> Result<Value, ExprError> {
        let program = self.cache.compile(&rule_source(test))?;
        let mut env = Env::read_only(document.root())
            .bind_path("fieldValue", at.value_path())
            .bind_path("stepFlow", at.step_path())
            .bind_path("schemaFlow", Vec::new());
        program.run(&mut env)
    }

    /// Run an `on_change` body for the field at `at`.
    ///
    /// The body sees `field`, `stepFlow`, `schemaFlow` and `self`, and may
    /// assign through the first three. Returns the effects requested on
    /// `self` and whether the document was written to.
    pub fn run_on_change(
        &self,
        body: &str,
        document: &mut Document,
        at: FieldAt,
    ) -> Result<(Vec<Effect>, bool), ExprError> {
        let program = self.cache.compile(body)?;
        let mut env = Env::writable(document.root_mut())
            .bind_path("field", at.field_path())
            .bind_path("stepFlow", at.step_path())
            .bind_path("schemaFlow", Vec::new())
            .bind_host("self");
        program.run(&mut env)?;
        let dirty = env.is_dirty();
        Ok((env.into_effects(), dirty))
    }
}

/// The body to compile for a rule test.
fn rule_source(test: &str) -> Cow<'_, str> {
    if test.to_lowercase().contains("return") {
        Cow::Borrowed(test)
    } else {
        Cow::Owned(format!("return {}", test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use serde_json::json;

    fn document(value: Value) -> Document {
        let schema = Schema::from_value(json!({
            "activeStep": 0,
            "steps": [{
                "index": 0,
                "fields": [
                    { "id": "kind", "value": value },
                    { "id": "other", "value": "B" }
                ]
            }]
        }))
        .unwrap();
        Document::new(&schema).unwrap()
    }

    #[test]
    fn test_truthy_result_carries_message() {
        let doc = document(json!("X"));
        let rule = Rule::new("fieldValue == 'X'", "Hidden for X");
        let outcome = RuleEvaluator::new()
            .evaluate(&rule, &doc, FieldAt::new(0, 0))
            .unwrap();
        assert!(outcome.result);
        assert_eq!(outcome.message, "Hidden for X");
    }

    #[test]
    fn test_falsy_result_has_empty_message() {
        let doc = document(json!("Y"));
        let rule = Rule::new("fieldValue == 'X'", "Hidden for X");
        let outcome = RuleEvaluator::new()
            .evaluate(&rule, &doc, FieldAt::new(0, 0))
            .unwrap();
        assert!(!outcome.result);
        assert_eq!(outcome.message, "");
    }

    #[test]
    fn test_missing_test_is_not_matched() {
        let doc = document(json!("X"));
        let rule = Rule {
            test: None,
            message: "unused".to_string(),
        };
        let outcome = RuleEvaluator::new()
            .evaluate(&rule, &doc, FieldAt::new(0, 0))
            .unwrap();
        assert_eq!(outcome, RuleOutcome::missing_test());
    }

    #[test]
    fn test_body_with_return_is_used_verbatim() {
        let doc = document(json!("X"));
        // Wrapped in another `return`, this body would not parse.
        let rule = Rule::new("let v = fieldValue; return v === 'X'", "m");
        let outcome = RuleEvaluator::new()
            .evaluate(&rule, &doc, FieldAt::new(0, 0))
            .unwrap();
        assert!(outcome.result);
    }

    #[test]
    fn test_return_detection_ignores_case_but_keyword_does_not() {
        let doc = document(json!("X"));
        let rule = Rule::new("if (fieldValue === 'X') { Return; }", "m");
        let outcome = RuleEvaluator::new().evaluate(&rule, &doc, FieldAt::new(0, 0));
        // Compiled verbatim, where `Return` is an ordinary identifier.
        assert!(matches!(outcome, Err(ExprError::UnknownIdentifier(name)) if name == "Return"));
    }

    #[test]
    fn test_schema_flow_binding() {
        let doc = document(json!(1));
        let evaluator = RuleEvaluator::new();
        let value = evaluator
            .evaluate_expression("schemaFlow.steps[0].fields.length", &doc, FieldAt::new(0, 0))
            .unwrap();
        assert_eq!(value, json!(2));
    }

    #[test]
    fn test_rules_cannot_assign() {
        let doc = document(json!(1));
        let rule = Rule::new("stepFlow.fields[1].value = 'Z'", "m");
        let result = RuleEvaluator::new().evaluate(&rule, &doc, FieldAt::new(0, 0));
        assert!(matches!(result, Err(ExprError::ReadOnly(_))));
    }

    #[test]
    fn test_syntax_error_propagates() {
        let doc = document(json!(1));
        let rule = Rule::new("fieldValue ==", "m");
        let result = RuleEvaluator::new().evaluate(&rule, &doc, FieldAt::new(0, 0));
        assert!(matches!(result, Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_oversized_rule_is_a_syntax_error() {
        let doc = document(json!(1));
        let rule = Rule::new(vec!["fieldValue"; 3_000].join(" + "), "m");
        let result = RuleEvaluator::new().evaluate(&rule, &doc, FieldAt::new(0, 0));
        assert!(matches!(result, Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_on_change_writes_document() {
        let mut doc = document(json!(12));
        let (effects, dirty) = RuleEvaluator::new()
            .run_on_change(
                "field.value > 10 && (stepFlow.fields[1].disabled = true)",
                &mut doc,
                FieldAt::new(0, 0),
            )
            .unwrap();
        assert!(effects.is_empty());
        assert!(dirty);
        assert_eq!(doc.root()["steps"][0]["fields"][1]["disabled"], json!(true));
    }
}
