//! # stepform-runtime
//!
//! Async persistence bridge for stepform.
//!
//! The core controller is synchronous: a save handler receives a
//! continuation and the move waits until it is handed back. This crate
//! drives that handshake against an async [`StepStore`]:
//! - per-attempt save timeouts
//! - retry with exponential backoff for transient store failures
//! - cancellation owned by a [`RequestScope`] instead of global handles
//!
//! ## Example
//!
//! ```rust,ignore
//! use stepform_core::{FormController, FormOptions, Schema};
//! use stepform_runtime::{FormSession, PersistenceConfig};
//!
//! let controller = FormController::new(schema, FormOptions::default());
//! let session = FormSession::new(controller, store, PersistenceConfig::default());
//!
//! session.with_controller(|form| form.on_model_change("name", "Ada".into()))?;
//! let outcome = session.next().await?;
//! if let Some(receipt) = outcome.receipt {
//!     println!("Saved step {} after {} attempt(s)", receipt.step_index, receipt.attempts);
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod session;

pub use cancel::{run_cancellable, RequestScope};
pub use config::PersistenceConfig;
pub use session::{FormSession, NavigationOutcome, SaveReceipt, StepStore, StoreError};

use std::time::Duration;

use stepform_core::FormError;
use thiserror::Error;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Request canceled")]
    Canceled,

    #[error("Save timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Form error: {0}")]
    Form(#[from] FormError),
}

impl RuntimeError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RuntimeError::Timeout(_) => true,
            RuntimeError::Store(e) => e.is_retryable(),
            RuntimeError::Canceled | RuntimeError::Form(_) => false,
        }
    }
}
