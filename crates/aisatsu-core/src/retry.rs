//! Retry policy and activity options.

use std::time::Duration;

/// Bounded exponential backoff for a fallible remote call.
///
/// The delay between attempt `k` and attempt `k + 1` is
/// `min(initial_interval * backoff_coefficient^(k - 1), maximum_interval)`.
/// `maximum_attempts` counts every attempt, the first one included.
///
/// # Examples
///
/// ```
/// use aisatsu_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(
///     Duration::from_secs(1),
///     Duration::from_secs(100),
///     2.0,
///     500,
/// )?;
///
/// // Delays: 1s, 2s, 4s, 8s, ... capped at 100s
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(100));
/// # Ok::<(), aisatsu_core::RetryPolicyError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    initial_interval: Duration,
    maximum_interval: Duration,
    backoff_coefficient: f64,
    maximum_attempts: u32,
}

/// Error returned when [`RetryPolicy`] configuration is invalid.
///
/// ```
/// use aisatsu_core::RetryPolicy;
/// use std::time::Duration;
///
/// // Invalid: coefficient below 1 would shrink the delay
/// let result = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 0.5, 3);
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicyError(pub &'static str);

impl std::fmt::Display for RetryPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RetryPolicyError {}

impl RetryPolicy {
    /// Creates a validated retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`RetryPolicyError`] if:
    /// - `backoff_coefficient` is below 1 or not finite
    /// - `maximum_attempts` is 0
    /// - `maximum_interval` is less than `initial_interval`
    pub fn new(
        initial_interval: Duration,
        maximum_interval: Duration,
        backoff_coefficient: f64,
        maximum_attempts: u32,
    ) -> Result<Self, RetryPolicyError> {
        if !backoff_coefficient.is_finite() || backoff_coefficient < 1.0 {
            return Err(RetryPolicyError("backoff_coefficient must be >= 1"));
        }
        if maximum_attempts == 0 {
            return Err(RetryPolicyError("maximum_attempts must be >= 1"));
        }
        if maximum_interval < initial_interval {
            return Err(RetryPolicyError(
                "maximum_interval must be >= initial_interval",
            ));
        }
        Ok(Self {
            initial_interval,
            maximum_interval,
            backoff_coefficient,
            maximum_attempts,
        })
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            maximum_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            maximum_attempts: 1,
        }
    }

    /// Delay before the second attempt.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Upper bound of any single delay.
    pub fn maximum_interval(&self) -> Duration {
        self.maximum_interval
    }

    /// Factor applied to the delay after each attempt.
    pub fn backoff_coefficient(&self) -> f64 {
        self.backoff_coefficient
    }

    /// Total number of attempts, the first one included.
    pub fn maximum_attempts(&self) -> u32 {
        self.maximum_attempts
    }

    /// Returns the delay to wait after the failed attempt number `attempt`.
    ///
    /// Attempts are 1-indexed; `0` is treated as `1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled =
            self.initial_interval.as_nanos() as f64 * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.maximum_interval.as_nanos() as f64);
        Duration::from_nanos(capped.round() as u64)
    }

    /// Returns `true` when another attempt is allowed after `attempt`.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.maximum_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            maximum_interval: Duration::from_secs(100),
            backoff_coefficient: 2.0,
            maximum_attempts: 500,
        }
    }
}

/// Options applied to every invocation of the translation activity.
///
/// # Examples
///
/// ```
/// use aisatsu_core::{ActivityOptions, RetryPolicy};
/// use std::time::Duration;
///
/// let options = ActivityOptions::default()
///     .with_start_to_close_timeout(Duration::from_secs(5))
///     .with_retry_policy(RetryPolicy::no_retry());
/// assert_eq!(options.retry_policy.maximum_attempts(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    /// Upper bound of a single attempt. Exceeding it counts as one
    /// retryable failure. Default: 30 seconds.
    pub start_to_close_timeout: Duration,
    /// Retry policy across attempts.
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    /// Sets the bound of a single attempt.
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
        }
    }
}
