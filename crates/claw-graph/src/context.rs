//! Per-request cancellation and per-call deadlines.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{GraphError, Result};

/// Carries the request's cancellation token and the bound applied to each
/// external call.
#[derive(Debug, Clone)]
pub struct QueryContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl QueryContext {
    /// Creates a context bound to `cancel`.
    #[must_use]
    pub const fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    /// Runs one external call under the per-call timeout, aborting early on
    /// cancellation.
    pub async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(GraphError::Cancelled {
                operation: operation.to_string(),
            }),
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    warn!(operation, timeout = ?self.timeout, "External call timed out");
                    Err(GraphError::Timeout {
                        operation: operation.to_string(),
                        timeout: self.timeout,
                    })
                }
            },
        }
    }
}
