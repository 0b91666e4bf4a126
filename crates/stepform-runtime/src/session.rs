//! Form session with async step persistence.
//!
//! [`FormSession`] owns a [`FormController`] and installs its save handler.
//! When a move needs a save, the session sends the step to a [`StepStore`],
//! applying the configured timeout and retries, then completes or abandons
//! the controller's continuation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use stepform_core::{
    Continuation, Direction, FormController, FormError, MessageVariant, Schema, Step, Transition,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cancel::{run_cancellable, RequestScope};
use crate::config::PersistenceConfig;
use crate::RuntimeError;

/// Errors reported by a [`StepStore`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Transient; the save is retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the step; retrying will not help
    #[error("Save rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Persists a step of a form.
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Save `step`; `state` is the whole form at the time of the move.
    async fn save_step(&self, step: &Step, state: &Schema) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: StepStore + ?Sized> StepStore for Arc<T> {
    async fn save_step(&self, step: &Step, state: &Schema) -> Result<(), StoreError> {
        (**self).save_step(step, state).await
    }
}

/// Proof that a step was persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaveReceipt {
    pub step_index: i64,
    pub attempts: usize,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NavigationOutcome {
    pub transition: Transition,

    /// Present when the move went through a save
    pub receipt: Option<SaveReceipt>,
}

struct SaveRequest {
    step: Step,
    state: Schema,
    continuation: Continuation,
}

/// A form controller bound to a step store.
pub struct FormSession<S> {
    controller: Arc<Mutex<FormController>>,
    requests: Arc<Mutex<Vec<SaveRequest>>>,
    store: S,
    config: PersistenceConfig,
    scope: RequestScope,
}

impl<S: StepStore> FormSession<S> {
    /// Bind `controller` to `store`. Any save handler already set on the
    /// controller is replaced.
    pub fn new(controller: FormController, store: S, config: PersistenceConfig) -> Self {
        let requests: Arc<Mutex<Vec<SaveRequest>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&requests);
        let controller = controller.with_save_handler(move |step, state, continuation| {
            sink.lock().push(SaveRequest {
                step: step.clone(),
                state: state.clone(),
                continuation,
            });
        });

        Self {
            controller: Arc::new(Mutex::new(controller)),
            requests,
            store,
            config,
            scope: RequestScope::new(),
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Shared handle to the controller.
    pub fn handle(&self) -> Arc<Mutex<FormController>> {
        Arc::clone(&self.controller)
    }

    /// Run `f` with exclusive access to the controller.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut FormController) -> R) -> R {
        let mut controller = self.controller.lock();
        f(&mut controller)
    }

    /// Cancel in-flight saves. The session accepts no further saves.
    pub fn close(&self) {
        self.scope.cancel();
    }

    pub async fn next(&self) -> Result<NavigationOutcome, RuntimeError> {
        self.navigate(Direction::Next).await
    }

    pub async fn prior(&self) -> Result<NavigationOutcome, RuntimeError> {
        self.navigate(Direction::Prior).await
    }

    async fn navigate(&self, direction: Direction) -> Result<NavigationOutcome, RuntimeError> {
        let transition = {
            let mut controller = self.controller.lock();
            match direction {
                Direction::Next => controller.next()?,
                Direction::Prior => controller.prior()?,
            }
        };
        if !matches!(transition, Transition::Pending { .. }) {
            return Ok(NavigationOutcome {
                transition,
                receipt: None,
            });
        }

        let request = self
            .requests
            .lock()
            .pop()
            .ok_or(RuntimeError::Form(FormError::StaleContinuation))?;
        let step_index = request.continuation.step_index();
        let token = self.scope.token();

        match self.persist(&request.step, &request.state, &token).await {
            Ok(attempts) => {
                let transition = self.controller.lock().complete(request.continuation)?;
                tracing::debug!(step = step_index, attempts, "Step saved");
                Ok(NavigationOutcome {
                    transition,
                    receipt: Some(SaveReceipt {
                        step_index,
                        attempts,
                        saved_at: Utc::now(),
                    }),
                })
            }
            Err(err) => {
                let mut controller = self.controller.lock();
                controller.abandon(request.continuation)?;
                if matches!(err, RuntimeError::Canceled) {
                    tracing::debug!(step = step_index, "Save canceled");
                } else {
                    tracing::warn!(step = step_index, error = %err, "Step save failed");
                    controller.show_message(
                        format!("Could not save step {}: {}", step_index, err),
                        MessageVariant::Error,
                    );
                }
                Err(err)
            }
        }
    }

    /// Save a step with timeout and retries.
    ///
    /// # Returns
    ///
    /// The number of attempts made.
    async fn persist(
        &self,
        step: &Step,
        state: &Schema,
        token: &CancellationToken,
    ) -> Result<usize, RuntimeError> {
        let attempts = AtomicUsize::new(0);
        let counter = &attempts;
        let store = &self.store;
        let limit = self.config.save_timeout;

        let save = || async move {
            counter.fetch_add(1, Ordering::Relaxed);
            match tokio::time::timeout(limit, store.save_step(step, state)).await {
                Ok(result) => result.map_err(RuntimeError::from),
                Err(_) => Err(RuntimeError::Timeout(limit)),
            }
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.config.retry_delay)
            .with_max_times(self.config.max_retries);

        let retrying = save
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(RuntimeError::is_retryable)
            .notify(|err: &RuntimeError, delay| {
                tracing::warn!(
                    step = step.index,
                    error = %err,
                    delay = ?delay,
                    "Save attempt failed, retrying"
                );
            });

        run_cancellable(token, retrying).await?;
        Ok(attempts.load(Ordering::Relaxed))
    }
}
