//! Retry executor with exponential backoff.

use crate::cancel::CancelFlag;
use crate::config::RetryConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The final result.
    pub result: SyncResult<T>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// Number of invocations that failed, excluding interruptions.
    pub failures: u32,
}

/// Loop state threaded through one `execute` call.
#[derive(Debug, Clone, Copy, Default)]
struct RetryState {
    attempts: u32,
    failures: u32,
    last_delay: Duration,
}

impl RetryState {
    fn finish<T>(self, result: SyncResult<T>) -> RetryOutcome<T> {
        RetryOutcome {
            result,
            attempts: self.attempts,
            failures: self.failures,
        }
    }
}

/// Runs fallible async operations with bounded, exponentially backed-off
/// retries.
///
/// Before every attempt the policy checks, in order:
/// 1. cancellation, which ends with [`SyncError::Cancelled`]
/// 2. connectivity, which ends with [`SyncError::NoConnectivity`]
///
/// Errors that are not [retryable](SyncError::is_retryable) end the loop
/// immediately. Retryable ones sleep for
/// [`RetryConfig::delay_after_failure`] and try again until
/// `max_attempts` is reached, then the last error is returned.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails permanently, or the
    /// attempts are exhausted. The operation receives the 1-based attempt
    /// number.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &CancelFlag,
        connectivity: &dyn Connectivity,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut state = RetryState::default();

        loop {
            if cancel.is_cancelled() {
                return state.finish(Err(SyncError::Cancelled));
            }
            if !connectivity.is_connected().await {
                return state.finish(Err(SyncError::NoConnectivity));
            }

            state.attempts += 1;
            let error = match operation(state.attempts).await {
                Ok(value) => return state.finish(Ok(value)),
                Err(e) if e.is_interruption() => return state.finish(Err(e)),
                Err(e) => e,
            };

            state.failures += 1;
            if !error.is_retryable() || state.attempts >= max_attempts {
                debug!(
                    attempts = state.attempts,
                    error = %error,
                    "giving up"
                );
                return state.finish(Err(error));
            }

            state.last_delay = self.config.delay_after_failure(state.failures);
            warn!(
                attempt = state.attempts,
                max_attempts,
                delay_ms = state.last_delay.as_millis() as u64,
                error = %error,
                "attempt failed, backing off"
            );
            tokio::time::sleep(state.last_delay).await;
        }
    }
}
