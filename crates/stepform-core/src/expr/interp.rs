//! Tree-walking interpreter for compiled rule expressions.
//!
//! All bindings that refer into the form tree are paths into one JSON
//! document, so `field`, `stepFlow.fields[i]` and `schemaFlow.steps[j].fields[i]`
//! read and write the same node.

use std::borrow::Cow;
use std::collections::HashMap;

use lazy_static::lazy_static;
use moka::sync::Cache;
use regex::Regex;
use serde_json::Value;

use super::parser::{BinaryOp, Expr, LogicalOp, Program, Stmt, UnaryOp};
use super::value::{
    compare, format_number, loose_eq, number, strict_eq, to_display, to_number, truthy, type_name,
};
use super::ExprError;

/// Compiled patterns kept for `String.prototype.match`.
const PATTERN_CAPACITY: u64 = 256;

lazy_static! {
    static ref PATTERN_CACHE: Cache<String, Regex> = Cache::new(PATTERN_CAPACITY);
}

/// One step of a path into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

impl PathSeg {
    pub fn key(key: impl Into<String>) -> Self {
        PathSeg::Key(key.into())
    }
}

/// What a bound name refers to.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A node inside the document.
    Path(Vec<PathSeg>),
    /// The hosting controller; only method calls are allowed on it.
    Host,
}

/// Side effects requested through the host binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ShowMessage { message: String, variant: String },
    SetNewState(Value),
}

enum Root<'a> {
    Shared(&'a Value),
    Exclusive(&'a mut Value),
}

/// Evaluation environment: the document, bound names and locals.
pub struct Env<'a> {
    root: Root<'a>,
    bindings: HashMap<String, Binding>,
    locals: HashMap<String, Value>,
    effects: Vec<Effect>,
    dirty: bool,
}

impl<'a> Env<'a> {
    /// An environment whose document cannot be assigned to.
    pub fn read_only(document: &'a Value) -> Self {
        Self::with_root(Root::Shared(document))
    }

    /// An environment whose assignments write into the document.
    pub fn writable(document: &'a mut Value) -> Self {
        Self::with_root(Root::Exclusive(document))
    }

    fn with_root(root: Root<'a>) -> Self {
        Self {
            root,
            bindings: HashMap::new(),
            locals: HashMap::new(),
            effects: Vec::new(),
            dirty: false,
        }
    }

    pub fn bind_path(mut self, name: impl Into<String>, path: Vec<PathSeg>) -> Self {
        self.bindings.insert(name.into(), Binding::Path(path));
        self
    }

    pub fn bind_host(mut self, name: impl Into<String>) -> Self {
        self.bindings.insert(name.into(), Binding::Host);
        self
    }

    /// Whether any assignment reached the document.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    fn document(&self) -> &Value {
        match &self.root {
            Root::Shared(v) => *v,
            Root::Exclusive(v) => &**v,
        }
    }
}

enum Flow {
    Normal,
    Return(Value),
}

/// Where an assignable expression lives.
enum Place {
    Document { binding: String, path: Vec<PathSeg> },
    Local { name: String, path: Vec<PathSeg> },
}

impl Program {
    /// Run the program. Returns the value of the first `return` reached, or
    /// `null` when the body completes without one.
    pub fn run(&self, env: &mut Env<'_>) -> Result<Value, ExprError> {
        match exec_block(&self.body, env)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Null),
        }
    }
}

fn exec_block(body: &[Stmt], env: &mut Env<'_>) -> Result<Flow, ExprError> {
    for stmt in body {
        if let Flow::Return(value) = exec(stmt, env)? {
            return Ok(Flow::Return(value));
        }
    }
    Ok(Flow::Normal)
}

fn exec(stmt: &Stmt, env: &mut Env<'_>) -> Result<Flow, ExprError> {
    match stmt {
        Stmt::Expr(expr) => {
            eval(expr, env)?;
            Ok(Flow::Normal)
        }
        Stmt::Return(expr) => {
            let value = match expr {
                Some(expr) => eval(expr, env)?,
                None => Value::Null,
            };
            Ok(Flow::Return(value))
        }
        Stmt::If {
            test,
            then,
            otherwise,
        } => {
            if truthy(&eval(test, env)?) {
                exec(then, env)
            } else if let Some(otherwise) = otherwise {
                exec(otherwise, env)
            } else {
                Ok(Flow::Normal)
            }
        }
        Stmt::Block(body) => exec_block(body, env),
        Stmt::Let { name, init } => {
            let value = match init {
                Some(expr) => eval(expr, env)?,
                None => Value::Null,
            };
            env.locals.insert(name.clone(), value);
            Ok(Flow::Normal)
        }
    }
}

fn eval(expr: &Expr, env: &mut Env<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env)?);
            }
            Ok(Value::Array(values))
        }
        Expr::Ident(name) => read_ident(name, env),
        Expr::Member { .. } | Expr::Index { .. } => read_member(expr, env),
        Expr::Call { callee, args } => call(callee, args, env),
        Expr::Unary { op, operand } => {
            let value = eval(operand, env)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!truthy(&value)),
                UnaryOp::Neg => number(-to_number(&value)),
                UnaryOp::Plus => number(to_number(&value)),
            })
        }
        Expr::Binary { op, left, right } => {
            let left = eval(left, env)?;
            let right = eval(right, env)?;
            Ok(binary(*op, &left, &right))
        }
        Expr::Logical { op, left, right } => {
            let left = eval(left, env)?;
            let short_circuit = match op {
                LogicalOp::And => !truthy(&left),
                LogicalOp::Or => truthy(&left),
            };
            if short_circuit {
                Ok(left)
            } else {
                eval(right, env)
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if truthy(&eval(test, env)?) {
                eval(consequent, env)
            } else {
                eval(alternate, env)
            }
        }
        Expr::Assign { target, value } => {
            let value = eval(value, env)?;
            assign(target, value.clone(), env)?;
            Ok(value)
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    use std::cmp::Ordering::*;

    match op {
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::NotEq => Value::Bool(!loose_eq(left, right)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(left, right)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_eq(left, right)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Less)),
        BinaryOp::Le => Value::Bool(matches!(compare(left, right), Some(Less | Equal))),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Greater)),
        BinaryOp::Ge => Value::Bool(matches!(compare(left, right), Some(Greater | Equal))),
        BinaryOp::Add => {
            let stringy = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
            if stringy(left) || stringy(right) {
                Value::String(format!("{}{}", to_display(left), to_display(right)))
            } else {
                number(to_number(left) + to_number(right))
            }
        }
        BinaryOp::Sub => number(to_number(left) - to_number(right)),
        BinaryOp::Mul => number(to_number(left) * to_number(right)),
        BinaryOp::Div => number(to_number(left) / to_number(right)),
        BinaryOp::Rem => number(to_number(left) % to_number(right)),
    }
}

fn read_ident(name: &str, env: &Env<'_>) -> Result<Value, ExprError> {
    if let Some(value) = env.locals.get(name) {
        return Ok(value.clone());
    }
    match env.bindings.get(name) {
        Some(Binding::Path(path)) => read_path(env.document(), path),
        Some(Binding::Host) => Err(ExprError::Type(format!(
            "'{}' only supports method calls",
            name
        ))),
        None => Err(ExprError::UnknownIdentifier(name.to_string())),
    }
}

fn read_member(expr: &Expr, env: &mut Env<'_>) -> Result<Value, ExprError> {
    if let Some(place) = resolve_place(expr, env)? {
        return match place {
            Place::Document { binding, path } => {
                let prefix = match env.bindings.get(&binding) {
                    Some(Binding::Path(prefix)) => prefix.clone(),
                    _ => return Err(ExprError::UnknownIdentifier(binding)),
                };
                let full: Vec<PathSeg> = prefix.into_iter().chain(path).collect();
                read_path(env.document(), &full)
            }
            Place::Local { name, path } => match env.locals.get(&name) {
                Some(value) => read_path(value, &path),
                None => Err(ExprError::UnknownIdentifier(name)),
            },
        };
    }

    // Not rooted in a binding: evaluate the object, then step into it.
    let (object, segment) = match expr {
        Expr::Member { object, property } => (eval(object, env)?, PathSeg::Key(property.clone())),
        Expr::Index { object, index } => {
            let object = eval(object, env)?;
            let index = eval(index, env)?;
            (object, segment_for(&index))
        }
        _ => return eval(expr, env),
    };
    Ok(child(&object, &segment)?.into_owned())
}

/// Resolve a member/index chain rooted in a path binding or a local.
///
/// Returns `None` for chains rooted in anything else (literals, calls,
/// value bindings), which are read by value instead.
fn resolve_place(expr: &Expr, env: &mut Env<'_>) -> Result<Option<Place>, ExprError> {
    match expr {
        Expr::Ident(name) => {
            if env.locals.contains_key(name) {
                return Ok(Some(Place::Local {
                    name: name.clone(),
                    path: Vec::new(),
                }));
            }
            match env.bindings.get(name) {
                Some(Binding::Path(_)) => Ok(Some(Place::Document {
                    binding: name.clone(),
                    path: Vec::new(),
                })),
                Some(_) => Ok(None),
                None => Err(ExprError::UnknownIdentifier(name.clone())),
            }
        }
        Expr::Member { object, property } => Ok(resolve_place(object, env)?
            .map(|place| push_segment(place, PathSeg::Key(property.clone())))),
        Expr::Index { object, index } => match resolve_place(object, env)? {
            Some(place) => {
                let index = eval(index, env)?;
                Ok(Some(push_segment(place, segment_for(&index))))
            }
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn push_segment(place: Place, segment: PathSeg) -> Place {
    match place {
        Place::Document { binding, mut path } => {
            path.push(segment);
            Place::Document { binding, path }
        }
        Place::Local { name, mut path } => {
            path.push(segment);
            Place::Local { name, path }
        }
    }
}

fn segment_for(index: &Value) -> PathSeg {
    match index {
        Value::Number(n) => match n.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 => PathSeg::Index(f as usize),
            Some(f) => PathSeg::Key(format_number(f)),
            None => PathSeg::Key(n.to_string()),
        },
        other => PathSeg::Key(to_display(other)),
    }
}

/// Read a node, cloning only the leaf.
pub fn read_path(root: &Value, path: &[PathSeg]) -> Result<Value, ExprError> {
    let mut current: Cow<'_, Value> = Cow::Borrowed(root);
    for segment in path {
        current = match current {
            Cow::Borrowed(value) => child(value, segment)?,
            Cow::Owned(value) => Cow::Owned(child(&value, segment)?.into_owned()),
        };
    }
    Ok(current.into_owned())
}

fn child<'v>(value: &'v Value, segment: &PathSeg) -> Result<Cow<'v, Value>, ExprError> {
    const UNDEFINED: Value = Value::Null;

    match (value, segment) {
        (Value::Null, segment) => Err(ExprError::Type(format!(
            "cannot read property '{}' of undefined",
            describe_segment(segment)
        ))),
        (Value::Object(map), PathSeg::Key(key)) => {
            Ok(map.get(key).map(Cow::Borrowed).unwrap_or(Cow::Owned(UNDEFINED)))
        }
        (Value::Object(map), PathSeg::Index(i)) => Ok(map
            .get(&i.to_string())
            .map(Cow::Borrowed)
            .unwrap_or(Cow::Owned(UNDEFINED))),
        (Value::Array(items), PathSeg::Index(i)) => {
            Ok(items.get(*i).map(Cow::Borrowed).unwrap_or(Cow::Owned(UNDEFINED)))
        }
        (Value::Array(items), PathSeg::Key(key)) => {
            if key == "length" {
                Ok(Cow::Owned(Value::from(items.len())))
            } else if let Ok(i) = key.parse::<usize>() {
                Ok(items.get(i).map(Cow::Borrowed).unwrap_or(Cow::Owned(UNDEFINED)))
            } else {
                Ok(Cow::Owned(UNDEFINED))
            }
        }
        (Value::String(s), PathSeg::Key(key)) if key == "length" => {
            Ok(Cow::Owned(Value::from(s.chars().count())))
        }
        (Value::String(s), PathSeg::Index(i)) => Ok(Cow::Owned(
            s.chars()
                .nth(*i)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(UNDEFINED),
        )),
        _ => Ok(Cow::Owned(UNDEFINED)),
    }
}

fn describe_segment(segment: &PathSeg) -> String {
    match segment {
        PathSeg::Key(key) => key.clone(),
        PathSeg::Index(i) => i.to_string(),
    }
}

fn assign(target: &Expr, value: Value, env: &mut Env<'_>) -> Result<(), ExprError> {
    if let Expr::Ident(name) = target {
        if let Some(slot) = env.locals.get_mut(name) {
            *slot = value;
            return Ok(());
        }
    }

    let place = resolve_place(target, env)?.ok_or_else(|| match target {
        Expr::Ident(name) => ExprError::ReadOnly(name.clone()),
        _ => ExprError::InvalidAssignment("target is not a bound name".to_string()),
    })?;

    match place {
        Place::Local { name, path } => {
            let slot = env
                .locals
                .get_mut(&name)
                .ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))?;
            write_path(slot, &path, value)
        }
        Place::Document { binding, path } => {
            let prefix = match env.bindings.get(&binding) {
                Some(Binding::Path(prefix)) => prefix.clone(),
                _ => return Err(ExprError::ReadOnly(binding)),
            };
            let full: Vec<PathSeg> = prefix.into_iter().chain(path).collect();
            match &mut env.root {
                Root::Shared(_) => Err(ExprError::ReadOnly(binding)),
                Root::Exclusive(document) => {
                    write_path(document, &full, value)?;
                    env.dirty = true;
                    Ok(())
                }
            }
        }
    }
}

/// Write a node, creating the final object member when missing.
pub fn write_path(root: &mut Value, path: &[PathSeg], value: Value) -> Result<(), ExprError> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for segment in parents {
        current = match (current, segment) {
            (Value::Object(map), PathSeg::Key(key)) => map.get_mut(key),
            (Value::Object(map), PathSeg::Index(i)) => map.get_mut(&i.to_string()),
            (Value::Array(items), PathSeg::Index(i)) => items.get_mut(*i),
            (Value::Array(items), PathSeg::Key(key)) => match key.parse::<usize>() {
                Ok(i) => items.get_mut(i),
                Err(_) => None,
            },
            _ => None,
        }
        .ok_or_else(|| {
            ExprError::Type(format!(
                "cannot set properties of undefined (reading '{}')",
                describe_segment(segment)
            ))
        })?;
    }

    match (current, last) {
        (Value::Object(map), segment) => {
            map.insert(describe_segment(segment), value);
            Ok(())
        }
        (Value::Array(items), PathSeg::Index(i)) if *i < items.len() => {
            items[*i] = value;
            Ok(())
        }
        (Value::Array(items), PathSeg::Index(i)) if *i == items.len() => {
            items.push(value);
            Ok(())
        }
        (other, segment) => Err(ExprError::Type(format!(
            "cannot set property '{}' on {}",
            describe_segment(segment),
            type_name(other)
        ))),
    }
}

fn call(callee: &Expr, args: &[Expr], env: &mut Env<'_>) -> Result<Value, ExprError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval(arg, env)?);
    }

    match callee {
        Expr::Member { object, property } => {
            if let Expr::Ident(name) = object.as_ref() {
                if !env.locals.contains_key(name)
                    && matches!(env.bindings.get(name), Some(Binding::Host))
                {
                    return call_host(property, values, env);
                }
            }
            let receiver = eval(object, env)?;
            call_method(&receiver, property, &values)
        }
        Expr::Ident(name) if !env.locals.contains_key(name) && !env.bindings.contains_key(name) => {
            call_global(name, &values)
        }
        _ => Err(ExprError::Type("expression is not a function".to_string())),
    }
}

fn call_host(method: &str, args: Vec<Value>, env: &mut Env<'_>) -> Result<Value, ExprError> {
    let mut args = args.into_iter();
    match method {
        "showSnackMessage" => {
            let message = args.next().map(|v| to_display(&v)).unwrap_or_default();
            let variant = args
                .next()
                .map(|v| to_display(&v))
                .unwrap_or_else(|| "info".to_string());
            env.effects.push(Effect::ShowMessage { message, variant });
            Ok(Value::Null)
        }
        "setNewState" => {
            env.effects
                .push(Effect::SetNewState(args.next().unwrap_or(Value::Null)));
            Ok(Value::Null)
        }
        other => Err(ExprError::UnknownMethod(format!("self.{}", other))),
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, ExprError> {
    match (receiver, method) {
        (Value::Null, _) => Err(ExprError::Type(format!(
            "cannot read property '{}' of undefined",
            method
        ))),
        (_, "toString") => Ok(Value::String(to_display(receiver))),
        (Value::String(s), "trim") => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "toLowerCase") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "toUpperCase") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "includes") => Ok(Value::Bool(s.contains(&to_display(&arg(args, 0))))),
        (Value::String(s), "startsWith") => {
            Ok(Value::Bool(s.starts_with(&to_display(&arg(args, 0)))))
        }
        (Value::String(s), "endsWith") => Ok(Value::Bool(s.ends_with(&to_display(&arg(args, 0))))),
        (Value::String(s), "indexOf") => {
            let needle = to_display(&arg(args, 0));
            Ok(match s.find(&needle) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::from(-1),
            })
        }
        (Value::String(s), "match") => string_match(s, &to_display(&arg(args, 0))),
        (Value::Array(items), "includes") => {
            let needle = arg(args, 0);
            Ok(Value::Bool(items.iter().any(|item| strict_eq(item, &needle))))
        }
        (Value::Array(items), "indexOf") => {
            let needle = arg(args, 0);
            Ok(match items.iter().position(|item| strict_eq(item, &needle)) {
                Some(i) => Value::from(i),
                None => Value::from(-1),
            })
        }
        (Value::Array(items), "join") => {
            let separator = match args.first() {
                Some(Value::Null) | None => ",".to_string(),
                Some(sep) => to_display(sep),
            };
            Ok(Value::String(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Null => String::new(),
                        other => to_display(other),
                    })
                    .collect::<Vec<_>>()
                    .join(&separator),
            ))
        }
        (Value::Number(_), "toFixed") => {
            let digits = to_number(&arg(args, 0)).clamp(0.0, 20.0) as usize;
            Ok(Value::String(format!("{:.*}", digits, to_number(receiver))))
        }
        (other, method) => Err(ExprError::UnknownMethod(format!(
            "{}.{}",
            type_name(other),
            method
        ))),
    }
}

fn compiled_pattern(pattern: &str) -> Result<Regex, ExprError> {
    if let Some(regex) = PATTERN_CACHE.get(pattern) {
        return Ok(regex);
    }
    let regex = Regex::new(pattern)
        .map_err(|e| ExprError::Type(format!("invalid pattern '{}': {}", pattern, e)))?;
    PATTERN_CACHE.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

fn string_match(haystack: &str, pattern: &str) -> Result<Value, ExprError> {
    let regex = compiled_pattern(pattern)?;
    Ok(match regex.captures(haystack) {
        Some(captures) => Value::Array(
            captures
                .iter()
                .map(|group| {
                    group
                        .map(|m| Value::String(m.as_str().to_string()))
                        .unwrap_or(Value::Null)
                })
                .collect(),
        ),
        None => Value::Null,
    })
}

fn call_global(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let first = arg(args, 0);
    match name {
        "Number" => Ok(number(to_number(&first))),
        "String" => Ok(Value::String(to_display(&first))),
        "Boolean" => Ok(Value::Bool(truthy(&first))),
        "isNaN" => Ok(Value::Bool(to_number(&first).is_nan())),
        other => Err(ExprError::UnknownIdentifier(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "activeStep": 0,
            "steps": [{
                "index": 0,
                "fields": [
                    { "id": "qty", "value": 5 },
                    { "id": "notes", "value": "  hi  " }
                ]
            }]
        })
    }

    fn field_path(field: usize) -> Vec<PathSeg> {
        vec![
            PathSeg::key("steps"),
            PathSeg::Index(0),
            PathSeg::key("fields"),
            PathSeg::Index(field),
        ]
    }

    fn run_read_only(source: &str, doc: &Value) -> Result<Value, ExprError> {
        let mut value_path = field_path(0);
        value_path.push(PathSeg::key("value"));
        let mut env = Env::read_only(doc)
            .bind_path("fieldValue", value_path)
            .bind_path("stepFlow", vec![PathSeg::key("steps"), PathSeg::Index(0)])
            .bind_path("schemaFlow", Vec::new());
        Program::parse(source)?.run(&mut env)
    }

    #[test]
    fn test_reads_through_bindings() {
        let doc = document();
        assert_eq!(run_read_only("return fieldValue > 3", &doc).unwrap(), json!(true));
        assert_eq!(
            run_read_only("return stepFlow.fields[1].value.trim().length", &doc).unwrap(),
            json!(2)
        );
        assert_eq!(
            run_read_only("return schemaFlow.steps.length", &doc).unwrap(),
            json!(1)
        );
    }

    #[test]
    fn test_logical_operators_return_operands() {
        let doc = document();
        assert_eq!(run_read_only("return 0 || 'x'", &doc).unwrap(), json!("x"));
        assert_eq!(run_read_only("return '' && boom", &doc).unwrap(), json!(""));
    }

    #[test]
    fn test_missing_member_is_undefined_but_null_access_fails() {
        let doc = document();
        assert_eq!(run_read_only("return stepFlow.nothing", &doc).unwrap(), Value::Null);
        assert!(matches!(
            run_read_only("return stepFlow.nothing.deeper", &doc),
            Err(ExprError::Type(_))
        ));
    }

    #[test]
    fn test_assignment_rejected_when_read_only() {
        let doc = document();
        assert!(matches!(
            run_read_only("stepFlow.fields[1].disabled = true", &doc),
            Err(ExprError::ReadOnly(name)) if name == "stepFlow"
        ));
    }

    #[test]
    fn test_assignment_aliases_single_document() {
        let mut doc = document();
        let mut env = Env::writable(&mut doc)
            .bind_path("field", field_path(0))
            .bind_path("stepFlow", vec![PathSeg::key("steps"), PathSeg::Index(0)])
            .bind_path("schemaFlow", Vec::new());
        let program =
            Program::parse("field.value = 11; stepFlow.fields[1].disabled = field.value > 10")
                .unwrap();
        program.run(&mut env).unwrap();
        assert!(env.is_dirty());
        assert_eq!(doc["steps"][0]["fields"][0]["value"], json!(11));
        assert_eq!(doc["steps"][0]["fields"][1]["disabled"], json!(true));
    }

    #[test]
    fn test_locals_and_conditionals() {
        let doc = document();
        let source = "let limit = 4; if (fieldValue > limit) { return 'big'; } return 'small';";
        assert_eq!(run_read_only(source, &doc).unwrap(), json!("big"));
        assert_eq!(run_read_only("return fieldValue ? 1 : 2", &doc).unwrap(), json!(1));
    }

    #[test]
    fn test_string_methods_and_globals() {
        let doc = document();
        assert_eq!(
            run_read_only("return 'A-12'.match('^[A-Z]-([0-9]+)$')[1]", &doc).unwrap(),
            json!("12")
        );
        assert_eq!(run_read_only("return 'abc'.match('z')", &doc).unwrap(), Value::Null);
        assert_eq!(run_read_only("return Number('7') + 1", &doc).unwrap(), json!(8));
        assert_eq!(run_read_only("return 'a' + 1", &doc).unwrap(), json!("a1"));
        assert_eq!(run_read_only("return [1, 2].includes(2)", &doc).unwrap(), json!(true));
    }

    #[test]
    fn test_host_calls_record_effects() {
        let mut doc = document();
        let mut env = Env::writable(&mut doc).bind_host("self");
        Program::parse("self.showSnackMessage('Saved', 'success')")
            .unwrap()
            .run(&mut env)
            .unwrap();
        assert!(!env.is_dirty());
        assert_eq!(
            env.into_effects(),
            vec![Effect::ShowMessage {
                message: "Saved".to_string(),
                variant: "success".to_string()
            }]
        );
    }

    #[test]
    fn test_pattern_cache_is_bounded() {
        let doc = document();
        for i in 0..(PATTERN_CAPACITY * 4) {
            let source = format!("return 'id-{i}'.match('^id-{i}$')[0]");
            assert_eq!(run_read_only(&source, &doc).unwrap(), json!(format!("id-{i}")));
        }
        PATTERN_CACHE.run_pending_tasks();
        assert!(PATTERN_CACHE.entry_count() <= PATTERN_CAPACITY);
    }

    #[test]
    fn test_invalid_pattern_is_a_type_error() {
        let doc = document();
        assert!(matches!(
            run_read_only("return 'a'.match('(')", &doc),
            Err(ExprError::Type(_))
        ));
    }

    #[test]
    fn test_host_binding_only_allows_calls() {
        let mut doc = document();
        let mut env = Env::writable(&mut doc).bind_host("self");
        let result = Program::parse("return self").unwrap().run(&mut env);
        assert!(matches!(result, Err(ExprError::Type(_))));
    }

    #[test]
    fn test_unknown_identifier() {
        let doc = document();
        assert!(matches!(
            run_read_only("return window.alert", &doc),
            Err(ExprError::UnknownIdentifier(name)) if name == "window"
        ));
    }

    #[test]
    fn test_body_without_return_is_undefined() {
        let doc = document();
        assert_eq!(run_read_only("fieldValue > 3", &doc).unwrap(), Value::Null);
    }
}
