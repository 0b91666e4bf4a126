//! stepform CLI: check, validate and preview form schemas.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use stepform_core::expr::value::to_display;
use stepform_core::schema::structure_violations;
use stepform_core::step_model::{find_field_index, step_by_index, step_position};
use stepform_core::{
    Document, Field, FieldAt, FieldRenderer, FormController, FormOptions, RenderMode,
    RenderedField, RendererRegistry, RuleEvaluator, Schema, StepReport,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stepform", version, about = "Check, validate and preview multi-step form schemas")]
struct Cli {
    /// Log rule evaluation and transitions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a schema and report structural problems
    Check {
        /// Schema file (.json, .yaml or .yml)
        file: PathBuf,
    },
    /// Apply field behaviors and validate a step
    Validate {
        /// Schema file
        file: PathBuf,
        /// Step `index` to validate; defaults to `activeStep`
        #[arg(long)]
        step: Option<i64>,
        /// Controller options file
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Evaluate a rule expression against a field
    Eval {
        /// Schema file
        file: PathBuf,
        /// Expression or function body
        expression: String,
        /// Step `index` holding the field
        #[arg(long, default_value_t = 0)]
        step: i64,
        /// Field `id`
        #[arg(long)]
        field: String,
    },
    /// Print the shown fields of a step
    Show {
        /// Schema file
        file: PathBuf,
        /// Step `index`; defaults to `activeStep`
        #[arg(long)]
        step: Option<i64>,
        /// Render every field read-only
        #[arg(long)]
        read_only: bool,
    },
}

#[derive(Debug, Serialize)]
struct ValidationOutput {
    #[serde(flatten)]
    report: StepReport,
    alerts: BTreeMap<String, String>,
    hidden: Vec<String>,
    disabled: Vec<String>,
}

/// Renders a field as one line of text.
struct PlainTextRenderer;

impl FieldRenderer for PlainTextRenderer {
    type Output = String;

    fn render(&self, field: &Field, mode: RenderMode) -> String {
        let label = field
            .attribute("label")
            .map(to_display)
            .unwrap_or_else(|| field.id.clone());
        let marker = if field.required { " *" } else { "" };
        let suffix = match mode {
            RenderMode::ReadOnly => " (read-only)",
            RenderMode::Interactive => "",
        };
        format!("{}{}: {}{}", label, marker, field.display_value(), suffix)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Check { file } => check(&file),
        Commands::Validate {
            file,
            step,
            options,
        } => validate(&file, step, options),
        Commands::Eval {
            file,
            expression,
            step,
            field,
        } => eval(&file, &expression, step, &field),
        Commands::Show {
            file,
            step,
            read_only,
        } => show(&file, step, read_only),
    }
}

fn load(file: &Path) -> Result<Schema> {
    Schema::from_path(file).with_context(|| format!("Failed to load {}", file.display()))
}

fn check(file: &Path) -> Result<ExitCode> {
    let document =
        Schema::read_document(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let (loaded, report) = check_document(document)?;
    for line in report {
        println!("{}", line);
    }
    Ok(if loaded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Report every structural problem of a document, or a summary when the
/// document loads.
fn check_document(document: Value) -> Result<(bool, Vec<String>)> {
    let violations = structure_violations(&document)?;
    if !violations.is_empty() {
        let mut report: Vec<String> = violations.iter().map(|v| format!("  {}", v)).collect();
        report.insert(0, format!("FAILED: {} structural problem(s)", violations.len()));
        return Ok((false, report));
    }

    let schema = Schema::from_value(document)?;
    let fields: usize = schema.steps.iter().map(|s| s.fields.len()).sum();
    let summary = format!(
        "OK: {} step(s), {} field(s), active step {}",
        schema.steps.len(),
        fields,
        schema.active_step
    );
    Ok((true, vec![summary]))
}

fn validate(file: &Path, step: Option<i64>, options: Option<PathBuf>) -> Result<ExitCode> {
    let mut schema = load(file)?;
    let options = match options {
        Some(path) => FormOptions::from_path(&path)
            .with_context(|| format!("Failed to load options {}", path.display()))?,
        None => FormOptions::default(),
    };
    if let Some(index) = step {
        if step_position(&schema, index).is_none() {
            return Err(anyhow!("Step {} not found", index));
        }
        schema.active_step = index;
    }

    let mut controller = FormController::new(schema, options);
    let report = controller.blur()?;
    let fields = controller
        .active_step()
        .map(|s| s.fields.as_slice())
        .unwrap_or_default();

    let output = ValidationOutput {
        alerts: fields
            .iter()
            .filter_map(|f| f.alert().map(|a| (f.id.clone(), a.to_string())))
            .collect(),
        hidden: fields.iter().filter(|f| f.hidden).map(|f| f.id.clone()).collect(),
        disabled: fields.iter().filter(|f| f.disabled).map(|f| f.id.clone()).collect(),
        report,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(if output.report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn eval(file: &Path, expression: &str, step: i64, field: &str) -> Result<ExitCode> {
    let schema = load(file)?;
    let position = step_position(&schema, step).ok_or_else(|| anyhow!("Step {} not found", step))?;
    let field_position = find_field_index(&schema.steps[position], field)
        .ok_or_else(|| anyhow!("Field '{}' not found in step {}", field, step))?;

    let document = Document::new(&schema)?;
    let value = RuleEvaluator::new().evaluate_expression(
        expression,
        &document,
        FieldAt::new(position, field_position),
    )?;
    println!("{}", serde_json::to_string(&value)?);
    Ok(ExitCode::SUCCESS)
}

fn show(file: &Path, step: Option<i64>, read_only: bool) -> Result<ExitCode> {
    let schema = load(file)?;
    let index = step.unwrap_or(schema.active_step);
    let step = step_by_index(&schema, index).ok_or_else(|| anyhow!("Step {} not found", index))?;

    if let Some(title) = step
        .flow_title
        .as_deref()
        .or(schema.flow_title.as_deref())
    {
        println!("{}", title);
    }

    let registry = RendererRegistry::new().with_fallback(PlainTextRenderer);
    let mode = if read_only {
        RenderMode::ReadOnly
    } else {
        RenderMode::Interactive
    };
    for rendered in registry.render_step(step, mode) {
        match rendered {
            RenderedField::Widget { span, output, .. } => println!("  [{:>2}] {}", span, output),
            undefined => println!("  {}", undefined.placeholder().unwrap_or_default()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_validate_command() {
        let cli = Cli::parse_from(["stepform", "-v", "validate", "form.yaml", "--step", "2"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Validate { file, step, options } => {
                assert_eq!(file, PathBuf::from("form.yaml"));
                assert_eq!(step, Some(2));
                assert!(options.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_eval_command() {
        let cli = Cli::parse_from([
            "stepform",
            "eval",
            "form.json",
            "fieldValue > 10",
            "--field",
            "qty",
        ]);
        match cli.command {
            Commands::Eval {
                expression,
                step,
                field,
                ..
            } => {
                assert_eq!(expression, "fieldValue > 10");
                assert_eq!(step, 0);
                assert_eq!(field, "qty");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_check_lists_structural_problems() {
        let document = json!({
            "steps": [
                { "fields": [] },
                { "index": 1, "fields": [{ "value": "x" }] }
            ]
        });
        let (loaded, report) = check_document(document).unwrap();
        assert!(!loaded);
        assert_eq!(report[0], "FAILED: 2 structural problem(s)");
        assert!(report[1].ends_with("at /steps/0"));
        assert!(report[2].ends_with("at /steps/1/fields/0"));
    }

    #[test]
    fn test_check_summarizes_valid_document() {
        let document = json!({
            "activeStep": 1,
            "steps": [
                { "index": 0, "fields": [{ "id": "a" }] },
                { "index": 1, "fields": [{ "id": "b" }, { "id": "c" }] }
            ]
        });
        let (loaded, report) = check_document(document).unwrap();
        assert!(loaded);
        assert_eq!(report, vec!["OK: 2 step(s), 3 field(s), active step 1".to_string()]);
    }

    #[test]
    fn test_check_reports_duplicate_ids_as_error() {
        let document = json!({
            "steps": [{ "index": 0, "fields": [{ "id": "a" }, { "id": "a" }] }]
        });
        assert!(check_document(document).is_err());
    }

    #[test]
    fn test_plain_text_renderer() {
        let field: Field = serde_json::from_value(json!({
            "id": "name",
            "label": "Name",
            "required": true,
            "value": "Ada"
        }))
        .unwrap();
        assert_eq!(
            PlainTextRenderer.render(&field, RenderMode::ReadOnly),
            "Name *: Ada (read-only)"
        );
        assert_eq!(
            PlainTextRenderer.render(&Field::new("city"), RenderMode::Interactive),
            "city: N/A"
        );
    }
}
