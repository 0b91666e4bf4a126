//! Restricted expression language for form rules.
//!
//! Rule tests and `on_change` hooks are authored as small JavaScript-like
//! function bodies. They are parsed into a [`Program`] and interpreted over
//! the form document; nothing is ever handed to a host language runtime.
//!
//! Supported:
//! - statements: `return`, `if`/`else`, blocks, `let`/`const`/`var`
//! - operators: assignment, `?:`, `||`, `&&`, `==`/`!=`/`===`/`!==`,
//!   relational, arithmetic, unary `!`/`-`/`+`
//! - member, index and call expressions, array literals
//! - `.length`, a handful of string and array methods, and the globals
//!   `Number`, `String`, `Boolean`, `isNaN`

mod interp;
mod lexer;
mod parser;
pub mod value;

use std::sync::Arc;

use moka::sync::Cache;
use thiserror::Error;

pub use interp::{read_path, write_path, Binding, Effect, Env, PathSeg};
pub use parser::{Program, MAX_DEPTH};

/// Errors raised while compiling or running an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Cannot assign through read-only binding: {0}")]
    ReadOnly(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),
}

impl ExprError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ExprError::Syntax {
            offset,
            message: message.into(),
        }
    }
}

/// Programs kept by a [`ProgramCache`] built with `new`.
pub const DEFAULT_PROGRAM_CAPACITY: u64 = 1_024;

/// Compiled programs keyed by source text.
///
/// The same rule text is evaluated on every validation pass, so it is
/// parsed once and shared. The cache holds at most `max_capacity` programs.
#[derive(Debug)]
pub struct ProgramCache {
    programs: Cache<String, Arc<Program>>,
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PROGRAM_CAPACITY)
    }
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            programs: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Return the compiled program for `source`, parsing it on first use.
    ///
    /// Syntax errors are not cached; a broken rule fails every time it runs.
    pub fn compile(&self, source: &str) -> Result<Arc<Program>, ExprError> {
        if let Some(program) = self.programs.get(source) {
            return Ok(program);
        }

        let program = Arc::new(Program::parse(source)?);
        self.programs.insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }

    /// Number of cached programs, after pending evictions have run.
    pub fn len(&self) -> usize {
        self.programs.run_pending_tasks();
        self.programs.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
