//! Request cancellation.
//!
//! A [`RequestScope`] owns a root token and hands out child tokens, one per
//! request. Canceling the scope, or dropping it, cancels every request it
//! issued. A canceled request's result is discarded.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::RuntimeError;

/// Owner of the cancellation tokens for a group of requests.
#[derive(Debug, Default)]
pub struct RequestScope {
    root: CancellationToken,
}

impl RequestScope {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// Token for a new request in this scope.
    pub fn token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancel every request issued by this scope, including later ones.
    pub fn cancel(&self) {
        self.root.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Run `future` unless `token` is canceled first.
///
/// # Returns
///
/// The future's own result, or `RuntimeError::Canceled`.
pub async fn run_cancellable<T, F>(token: &CancellationToken, future: F) -> Result<T, RuntimeError>
where
    F: Future<Output = Result<T, RuntimeError>>,
{
    if token.is_cancelled() {
        return Err(RuntimeError::Canceled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(RuntimeError::Canceled),
        result = future => result,
    }
}
