//! Retry loop around a fallible remote call.

use crate::activity::ActivityContext;
use aisatsu_core::{ActivityError, ActivityFailure, ActivityOptions, RemoteCallResult};
use std::future::Future;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failure type reported when an attempt exceeds its start-to-close timeout.
pub const START_TO_CLOSE_TIMEOUT: &str = "StartToCloseTimeout";

/// Invokes a remote call under [`ActivityOptions`].
///
/// Each attempt is bounded by `start_to_close_timeout`. Retryable failures
/// (timeouts included) are retried after the policy's backoff until
/// `maximum_attempts` is reached; terminal failures return at once.
///
/// Cancellation never abandons an attempt in flight: the attempt sees the
/// request through its [`ActivityContext`] and the invoker waits for it to
/// return. A cancelled backoff stops immediately.
#[derive(Debug, Clone, Default)]
pub struct RemoteCallInvoker {
    options: ActivityOptions,
}

impl RemoteCallInvoker {
    /// Creates an invoker applying `options` to every call.
    pub fn new(options: ActivityOptions) -> Self {
        Self { options }
    }

    /// Options applied to every call.
    pub fn options(&self) -> &ActivityOptions {
        &self.options
    }

    /// Runs `attempt_fn` until it succeeds, fails terminally, runs out of attempts or is cancelled.
    pub async fn invoke<T, F, Fut>(
        &self,
        activity: &str,
        cancellation: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<T, ActivityError>
    where
        F: FnMut(ActivityContext) -> Fut,
        Fut: Future<Output = RemoteCallResult<T>>,
    {
        let policy = &self.options.retry_policy;
        let attempt_timeout = self.options.start_to_close_timeout;
        let mut attempt: u32 = 1;

        loop {
            if cancellation.is_cancelled() {
                return Err(ActivityError::Cancelled {
                    activity: activity.to_string(),
                    attempts: attempt - 1,
                });
            }

            let ctx = ActivityContext::new(activity, attempt, cancellation.clone());
            let outcome = match timeout(attempt_timeout, attempt_fn(ctx)).await {
                Ok(outcome) => outcome,
                Err(_) => RemoteCallResult::RetryableFailure(ActivityFailure::new(
                    START_TO_CLOSE_TIMEOUT,
                    format!("attempt {} exceeded {:?}", attempt, attempt_timeout),
                )),
            };

            let failure = match outcome {
                RemoteCallResult::Success(value) => {
                    debug!("Activity '{}' succeeded on attempt {}", activity, attempt);
                    return Ok(value);
                }
                RemoteCallResult::TerminalFailure(failure) => {
                    warn!(
                        "Activity '{}' failed with non-retryable error: {}",
                        activity, failure
                    );
                    return Err(ActivityError::NonRetryable {
                        activity: activity.to_string(),
                        failure,
                        attempts: attempt,
                    });
                }
                RemoteCallResult::RetryableFailure(failure) => failure,
            };

            if cancellation.is_cancelled() {
                info!("Activity '{}' cancelled during attempt {}", activity, attempt);
                return Err(ActivityError::Cancelled {
                    activity: activity.to_string(),
                    attempts: attempt,
                });
            }

            if !policy.allows_retry_after(attempt) {
                warn!(
                    "Activity '{}' failed after {} attempt(s): {}",
                    activity, attempt, failure
                );
                return Err(ActivityError::RetriesExhausted {
                    activity: activity.to_string(),
                    failure,
                    attempts: attempt,
                });
            }

            let delay = policy.delay_for_attempt(attempt);
            info!(
                "Activity '{}' failed ({}), retrying ({}/{}) in {:?}",
                activity,
                failure,
                attempt + 1,
                policy.maximum_attempts(),
                delay
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancellation.cancelled() => {
                    info!("Activity '{}' cancelled during backoff", activity);
                    return Err(ActivityError::Cancelled {
                        activity: activity.to_string(),
                        attempts: attempt,
                    });
                }
            }

            attempt += 1;
        }
    }
}
