//! Workflow error types.

use crate::activity::ActivityFailure;
use crate::types::WorkflowId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal outcome of a remote call once the retry loop gave up.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityError {
    /// The remote operation classified the failure as permanent.
    #[error("activity '{activity}' failed with a non-retryable error after {attempts} attempt(s): {failure}")]
    NonRetryable {
        activity: String,
        failure: ActivityFailure,
        attempts: u32,
    },

    /// Every allowed attempt failed with a retryable error.
    #[error("activity '{activity}' exhausted {attempts} attempt(s): {failure}")]
    RetriesExhausted {
        activity: String,
        failure: ActivityFailure,
        attempts: u32,
    },

    /// The owning execution was cancelled.
    #[error("activity '{activity}' cancelled after {attempts} attempt(s)")]
    Cancelled { activity: String, attempts: u32 },
}

impl ActivityError {
    /// Returns the last failure reported by the remote operation, if any.
    pub fn failure(&self) -> Option<&ActivityFailure> {
        match self {
            ActivityError::NonRetryable { failure, .. }
            | ActivityError::RetriesExhausted { failure, .. } => Some(failure),
            ActivityError::Cancelled { .. } => None,
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            ActivityError::NonRetryable { attempts, .. }
            | ActivityError::RetriesExhausted { attempts, .. }
            | ActivityError::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Failure of the durable history store.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    #[error("history already exists for workflow {0}")]
    AlreadyExists(WorkflowId),

    #[error("no history for workflow {0}")]
    NotFound(WorkflowId),

    #[error("history codec error: {0}")]
    Codec(String),

    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of the search attribute index.
///
/// Never surfaces to workflow callers; the status projector logs it and
/// falls back to `Phase::Unknown` on reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("search attribute index unavailable: {0}")]
    Unavailable(String),

    #[error("invalid value '{value}' for search attribute {key}")]
    InvalidValue { key: String, value: String },
}

/// Errors that can occur when starting, signaling, querying or running a
/// workflow execution.
///
/// ```
/// use aisatsu_core::{WorkflowError, WorkflowId};
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::NotFound(id) => format!("no execution {}", id),
///         WorkflowError::AlreadyExists(id) => format!("duplicate {}", id),
///         WorkflowError::ActivityFailed(e) => format!("remote call failed: {}", e),
///         _ => error.to_string(),
///     }
/// }
///
/// let error = WorkflowError::NotFound(WorkflowId::new("hello-x"));
/// assert_eq!(describe(&error), "no execution hello-x");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum WorkflowError {
    /// No execution was ever started with this identifier.
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    /// An execution with this identifier already exists.
    #[error("Workflow already exists: {0}")]
    AlreadyExists(WorkflowId),

    /// The remote call ended in a terminal failure.
    #[error("Activity failed: {0}")]
    ActivityFailed(#[from] ActivityError),

    /// The execution was cancelled before completing.
    #[error("Workflow cancelled: {0}")]
    Cancelled(WorkflowId),

    /// Replay produced a command that disagrees with recorded history.
    #[error("Non-deterministic replay in {workflow_id}: expected {expected}, found {found}")]
    NonDeterministic {
        workflow_id: WorkflowId,
        expected: String,
        found: String,
    },

    /// The durable history store failed.
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Invalid options or inputs.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),
}

impl From<StoreError> for WorkflowError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AlreadyExists(id) => WorkflowError::AlreadyExists(id),
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            other => WorkflowError::Storage(other),
        }
    }
}
