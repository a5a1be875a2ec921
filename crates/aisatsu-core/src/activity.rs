//! Classified outcome of a single remote call attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason a remote call attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFailure {
    /// Stable failure type, e.g. `InvalidLangageCode`.
    pub failure_type: String,
    /// Human readable description.
    pub message: String,
    /// Underlying error, when the failure wraps one.
    pub cause: Option<String>,
}

impl ActivityFailure {
    /// Creates a failure without a cause.
    pub fn new(failure_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            failure_type: failure_type.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the underlying error.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for ActivityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.failure_type, self.message)
    }
}

/// Result of one attempt of a remote call.
///
/// The remote operation decides whether a failure is worth retrying.
///
/// ```
/// use aisatsu_core::RemoteCallResult;
///
/// let ok: RemoteCallResult<&str> = RemoteCallResult::Success("Bonjour");
/// assert!(ok.is_success());
///
/// let transient: RemoteCallResult<&str> =
///     RemoteCallResult::retryable("TranslateServiceUnavailable", "try later");
/// assert!(transient.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCallResult<T> {
    Success(T),
    RetryableFailure(ActivityFailure),
    TerminalFailure(ActivityFailure),
}

impl<T> RemoteCallResult<T> {
    /// Creates a failure that the invoker retries.
    pub fn retryable(failure_type: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteCallResult::RetryableFailure(ActivityFailure::new(failure_type, message))
    }

    /// Creates a failure that is never retried.
    pub fn terminal(failure_type: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteCallResult::TerminalFailure(ActivityFailure::new(failure_type, message))
    }

    /// Returns `true` for `Success`.
    pub fn is_success(&self) -> bool {
        matches!(self, RemoteCallResult::Success(_))
    }

    /// Returns `true` for `RetryableFailure`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteCallResult::RetryableFailure(_))
    }

    /// Maps the success value, keeping failures as they are.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RemoteCallResult<U> {
        match self {
            RemoteCallResult::Success(value) => RemoteCallResult::Success(f(value)),
            RemoteCallResult::RetryableFailure(failure) => {
                RemoteCallResult::RetryableFailure(failure)
            }
            RemoteCallResult::TerminalFailure(failure) => RemoteCallResult::TerminalFailure(failure),
        }
    }
}
