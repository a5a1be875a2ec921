//! Workflow identifiers, inputs, outputs and phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier of one workflow execution.
///
/// Assigned at start time and never changed. It is the only key used to
/// resolve an execution for signals, queries and status reads.
///
/// # Examples
///
/// ```
/// use aisatsu_core::WorkflowId;
///
/// let id = WorkflowId::new("hello-ada-1");
/// assert_eq!(id.as_str(), "hello-ada-1");
///
/// let id: WorkflowId = "hello-bob-2".into();
/// assert_eq!(id.to_string(), "hello-bob-2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(String);

impl WorkflowId {
    /// Creates a new WorkflowId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for WorkflowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for WorkflowId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for WorkflowId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Language selector delivered at start or through a signal.
///
/// `Wtf` is never translatable; the translation activity rejects it with a
/// non-retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    Fr,
    Es,
    En,
    Wtf,
}

impl LanguageCode {
    /// Lowercase code as used in signals and history.
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageCode::Fr => "fr",
            LanguageCode::Es => "es",
            LanguageCode::En => "en",
            LanguageCode::Wtf => "wtf",
        }
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported language code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language code: {0}")]
pub struct ParseLanguageCodeError(pub String);

impl FromStr for LanguageCode {
    type Err = ParseLanguageCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fr" => Ok(LanguageCode::Fr),
            "es" => Ok(LanguageCode::Es),
            "en" => Ok(LanguageCode::En),
            "wtf" => Ok(LanguageCode::Wtf),
            other => Err(ParseLanguageCodeError(other.to_string())),
        }
    }
}

/// Input of a hello workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    /// Name of the person to greet.
    pub name: String,
    /// Language to greet in. `None` makes the execution wait for a signal.
    pub language_code: Option<LanguageCode>,
}

impl HelloRequest {
    /// Creates a request.
    pub fn new(name: impl Into<String>, language_code: Option<LanguageCode>) -> Self {
        Self {
            name: name.into(),
            language_code,
        }
    }
}

/// Output of a successfully completed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloResponse {
    /// The greeting, `"<word> <name> !"`.
    pub message: String,
}

impl HelloResponse {
    /// Builds the greeting as `"<word> <name> !"`.
    ///
    /// ```
    /// use aisatsu_core::HelloResponse;
    ///
    /// let response = HelloResponse::greeting("Bonjour", "Ada");
    /// assert_eq!(response.message, "Bonjour Ada !");
    /// ```
    pub fn greeting(word: &str, name: &str) -> Self {
        Self {
            message: format!("{} {} !", word, name),
        }
    }
}

/// Observable phase of an execution.
///
/// `Unknown` is what the status side channel reports when nothing has been
/// projected for an id. An execution never occupies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Initial,
    Waiting,
    Completed,
    Error,
    Unknown,
}

impl Phase {
    /// Uppercase name as written to the status search attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initial => "INITIAL",
            Phase::Waiting => "WAITING",
            Phase::Completed => "COMPLETED",
            Phase::Error => "ERROR",
            Phase::Unknown => "UNKNOWN",
        }
    }

    /// Returns `true` for phases no further transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown phase name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase: {0}")]
pub struct ParsePhaseError(pub String);

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(Phase::Initial),
            "WAITING" => Ok(Phase::Waiting),
            "COMPLETED" => Ok(Phase::Completed),
            "ERROR" => Ok(Phase::Error),
            "UNKNOWN" => Ok(Phase::Unknown),
            other => Err(ParsePhaseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_id() {
        let id = WorkflowId::new("hello-ada");
        assert_eq!(id.as_str(), "hello-ada");

        let id: WorkflowId = "hello-ada".into();
        assert_eq!(id, WorkflowId::new("hello-ada"));
    }

    #[test]
    fn test_language_code_parse() {
        assert_eq!("fr".parse::<LanguageCode>(), Ok(LanguageCode::Fr));
        assert_eq!("wtf".parse::<LanguageCode>(), Ok(LanguageCode::Wtf));
        assert_eq!(
            "FR".parse::<LanguageCode>(),
            Err(ParseLanguageCodeError("FR".to_string()))
        );
    }

    #[test]
    fn test_language_code_serde() {
        let json = serde_json::to_string(&LanguageCode::Es).expect("serialize");
        assert_eq!(json, "\"es\"");
    }

    #[test]
    fn test_phase_display_and_parse() {
        assert_eq!(Phase::Waiting.to_string(), "WAITING");
        assert_eq!("COMPLETED".parse::<Phase>(), Ok(Phase::Completed));
        assert!("done".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_terminal() {
        assert!(Phase::Completed.is_terminal());
        assert!(Phase::Error.is_terminal());
        assert!(!Phase::Waiting.is_terminal());
        assert!(!Phase::Unknown.is_terminal());
    }

    #[test]
    fn test_greeting() {
        let response = HelloResponse::greeting("Hola", "Bob");
        assert_eq!(response.message, "Hola Bob !");
    }
}
