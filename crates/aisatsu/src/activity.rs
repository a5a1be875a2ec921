//! The translation activity invoked by the hello workflow.

use aisatsu_core::{ActivityFailure, LanguageCode, RemoteCallResult};
use async_trait::async_trait;
use rand::Rng;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Activity name recorded in history and logs.
pub const TRANSLATE_HELLO: &str = "TranslateHello";

/// Per-attempt information handed to an activity.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    activity: String,
    attempt: u32,
    cancellation: CancellationToken,
}

impl ActivityContext {
    /// Creates the context of one attempt.
    pub fn new(activity: impl Into<String>, attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            activity: activity.into(),
            attempt,
            cancellation,
        }
    }

    /// Name of the activity being attempted.
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// 1-indexed attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns `true` once the owning execution asked the attempt to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the owning execution asks the attempt to stop.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

/// Remote operation translating the word "hello".
///
/// Implementations classify their failures: a terminal failure is never
/// retried, anything else is retried under the worker's retry policy.
///
/// # Examples
///
/// ```
/// use aisatsu::prelude::*;
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct AlwaysHello;
///
/// #[async_trait]
/// impl TranslationActivity for AlwaysHello {
///     async fn translate_hello(
///         &self,
///         _ctx: ActivityContext,
///         _language_code: LanguageCode,
///     ) -> RemoteCallResult<String> {
///         RemoteCallResult::Success("Hello".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait TranslationActivity: Send + Sync + Debug {
    async fn translate_hello(
        &self,
        ctx: ActivityContext,
        language_code: LanguageCode,
    ) -> RemoteCallResult<String>;
}

/// Reference translation with optional chaos injection.
///
/// With a non-zero failure rate each attempt first fails with a retryable
/// `TranslateServiceUnavailable` error with that probability.
#[derive(Debug, Clone, Default)]
pub struct HelloTranslationActivity {
    failure_rate: f64,
}

impl HelloTranslationActivity {
    /// Creates the activity without failure injection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables random transient failures. The rate is clamped to `[0, 1]`.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        self
    }

    /// Probability of an injected failure per attempt.
    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    fn inject_error_randomly(&self) -> Option<ActivityFailure> {
        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Some(
                ActivityFailure::new(
                    "TranslateServiceUnavailable",
                    "Translate Service temporarily unavailable",
                )
                .with_cause("injected failure"),
            );
        }
        None
    }
}

#[async_trait]
impl TranslationActivity for HelloTranslationActivity {
    async fn translate_hello(
        &self,
        ctx: ActivityContext,
        language_code: LanguageCode,
    ) -> RemoteCallResult<String> {
        info!(attempt = ctx.attempt(), "Translate Hello To {}", language_code);

        if let Some(failure) = self.inject_error_randomly() {
            return RemoteCallResult::RetryableFailure(failure);
        }

        match language_code {
            LanguageCode::Fr => RemoteCallResult::Success("Bonjour".to_string()),
            LanguageCode::Es => RemoteCallResult::Success("Hola".to_string()),
            LanguageCode::En => RemoteCallResult::Success("Hello".to_string()),
            LanguageCode::Wtf => RemoteCallResult::terminal(
                "InvalidLangageCode",
                format!("invalid langage code: {}", language_code),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActivityContext {
        ActivityContext::new(TRANSLATE_HELLO, 1, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_translations() {
        let activity = HelloTranslationActivity::new();
        assert_eq!(
            activity.translate_hello(ctx(), LanguageCode::Fr).await,
            RemoteCallResult::Success("Bonjour".to_string())
        );
        assert_eq!(
            activity.translate_hello(ctx(), LanguageCode::Es).await,
            RemoteCallResult::Success("Hola".to_string())
        );
        assert_eq!(
            activity.translate_hello(ctx(), LanguageCode::En).await,
            RemoteCallResult::Success("Hello".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_code_is_terminal() {
        let activity = HelloTranslationActivity::new();
        match activity.translate_hello(ctx(), LanguageCode::Wtf).await {
            RemoteCallResult::TerminalFailure(failure) => {
                assert_eq!(failure.failure_type, "InvalidLangageCode");
                assert_eq!(failure.message, "invalid langage code: wtf");
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_failure_rate_is_retryable() {
        let activity = HelloTranslationActivity::new().with_failure_rate(1.0);
        let result = activity.translate_hello(ctx(), LanguageCode::Fr).await;
        assert!(result.is_retryable());
    }

    #[test]
    fn test_failure_rate_is_clamped() {
        assert_eq!(HelloTranslationActivity::new().with_failure_rate(3.0).failure_rate(), 1.0);
        assert_eq!(HelloTranslationActivity::new().with_failure_rate(-1.0).failure_rate(), 0.0);
        assert_eq!(
            HelloTranslationActivity::new().with_failure_rate(f64::NAN).failure_rate(),
            0.0
        );
    }
}
