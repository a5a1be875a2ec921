//! Append-only history of a workflow execution.
//!
//! Every externally visible decision of an execution is recorded here before
//! (or as) it happens. Replaying the history after a restart reproduces the
//! same decisions without repeating the side effects.

use crate::error::{ActivityError, WorkflowError};
use crate::types::{HelloRequest, HelloResponse, LanguageCode};
use serde::{Deserialize, Serialize};

/// One recorded entry of an execution's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// First event of every execution.
    WorkflowStarted { input: HelloRequest },
    /// A search attribute was written to the index.
    SearchAttributeUpserted { key: String, value: String },
    /// A language signal was delivered.
    SignalReceived { language_code: LanguageCode },
    /// A non-deterministic value was sampled once.
    SideEffectRecorded { value: serde_json::Value },
    /// The language was committed and the remote call started.
    ActivityScheduled {
        activity: String,
        language_code: LanguageCode,
    },
    ActivityCompleted { result: String },
    ActivityFailed { error: ActivityError },
    /// Cancellation was requested by a client.
    CancelRequested,
    WorkflowCompleted { response: HelloResponse },
    WorkflowFailed { error: WorkflowError },
}

impl HistoryEvent {
    /// Short name used in logs and replay mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::WorkflowStarted { .. } => "WorkflowStarted",
            HistoryEvent::SearchAttributeUpserted { .. } => "SearchAttributeUpserted",
            HistoryEvent::SignalReceived { .. } => "SignalReceived",
            HistoryEvent::SideEffectRecorded { .. } => "SideEffectRecorded",
            HistoryEvent::ActivityScheduled { .. } => "ActivityScheduled",
            HistoryEvent::ActivityCompleted { .. } => "ActivityCompleted",
            HistoryEvent::ActivityFailed { .. } => "ActivityFailed",
            HistoryEvent::CancelRequested => "CancelRequested",
            HistoryEvent::WorkflowCompleted { .. } => "WorkflowCompleted",
            HistoryEvent::WorkflowFailed { .. } => "WorkflowFailed",
        }
    }

    /// Returns `true` for events produced by the execution's own control
    /// flow. Signals, cancellation requests and the start event come from
    /// outside and are not replayed as commands.
    pub fn is_command(&self) -> bool {
        !matches!(
            self,
            HistoryEvent::WorkflowStarted { .. }
                | HistoryEvent::SignalReceived { .. }
                | HistoryEvent::CancelRequested
        )
    }

    /// Returns `true` for the events that close a history.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistoryEvent::WorkflowCompleted { .. } | HistoryEvent::WorkflowFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = HistoryEvent::SignalReceived {
            language_code: LanguageCode::Fr,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"type": "signal_received", "language_code": "fr"})
        );

        let decoded: HistoryEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_classification() {
        let started = HistoryEvent::WorkflowStarted {
            input: HelloRequest::new("Ada", None),
        };
        assert!(!started.is_command());
        assert!(!HistoryEvent::CancelRequested.is_command());

        let completed = HistoryEvent::WorkflowCompleted {
            response: HelloResponse::greeting("Hello", "Ada"),
        };
        assert!(completed.is_command());
        assert!(completed.is_terminal());
        assert_eq!(completed.kind(), "WorkflowCompleted");
    }
}
