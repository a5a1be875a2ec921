//! Replay-aware primitives used by the hello workflow.

use crate::activity::{TranslationActivity, TRANSLATE_HELLO};
use crate::invoker::RemoteCallInvoker;
use crate::projector::{StatusProjector, STATUS_SEARCH_ATTRIBUTE};
use crate::workflow::Execution;
use aisatsu_core::{
    ActivityError, HelloRequest, HelloResponse, HistoryEvent, LanguageCode, Phase, StoreError,
    WorkflowError, WorkflowId,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

/// Execution context handed to the workflow's run sequence.
///
/// Every step that has an effect outside the execution goes through here.
/// While recorded commands remain, a step is matched against the next one and
/// its recorded result is returned instead of being executed again. A step
/// that does not match the recorded command fails with
/// [`WorkflowError::NonDeterministic`]. Once the recorded commands are used
/// up, steps run live and are appended to history.
pub struct WorkflowContext {
    execution: Arc<Execution>,
    projector: StatusProjector,
    invoker: RemoteCallInvoker,
    activity: Arc<dyn TranslationActivity>,
    activity_task_queue: String,
    replay: VecDeque<HistoryEvent>,
}

impl WorkflowContext {
    pub(crate) fn new(
        execution: Arc<Execution>,
        projector: StatusProjector,
        invoker: RemoteCallInvoker,
        activity: Arc<dyn TranslationActivity>,
        activity_task_queue: String,
        replay: VecDeque<HistoryEvent>,
    ) -> Self {
        Self {
            execution,
            projector,
            invoker,
            activity,
            activity_task_queue,
            replay,
        }
    }

    /// Identifier of the execution.
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.execution.id
    }

    /// Input the execution was started with.
    pub fn input(&self) -> &HelloRequest {
        &self.execution.input
    }

    /// Returns `true` while recorded commands remain to be replayed.
    pub fn is_replaying(&self) -> bool {
        !self.replay.is_empty()
    }

    /// Language currently held by the execution, if any.
    pub async fn language_code(&self) -> Option<LanguageCode> {
        self.execution.state.lock().await.language_code
    }

    fn mismatch(&self, expected: impl fmt::Debug, found: &HistoryEvent) -> WorkflowError {
        WorkflowError::NonDeterministic {
            workflow_id: self.execution.id.clone(),
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }

    /// Consumes the next recorded command if it equals `expected`.
    ///
    /// Returns `Ok(false)` when nothing is left to replay.
    fn replay_matches(&mut self, expected: &HistoryEvent) -> Result<bool, WorkflowError> {
        match self.replay.pop_front() {
            None => Ok(false),
            Some(recorded) if &recorded == expected => {
                debug!(workflow_id = %self.execution.id, "Replayed {}", recorded.kind());
                Ok(true)
            }
            Some(recorded) => Err(self.mismatch(expected, &recorded)),
        }
    }

    async fn record(&self, event: HistoryEvent) -> Result<(), WorkflowError> {
        self.execution.history.append(&self.execution.id, event).await?;
        Ok(())
    }

    /// Publishes `phase` to the status projection and the local replica.
    ///
    /// Projection failures are logged and never fail the execution. Replayed
    /// upserts are not projected again.
    pub async fn upsert_phase(&mut self, phase: Phase) -> Result<(), WorkflowError> {
        let event = HistoryEvent::SearchAttributeUpserted {
            key: STATUS_SEARCH_ATTRIBUTE.to_string(),
            value: phase.to_string(),
        };
        if self.replay_matches(&event)? {
            return Ok(());
        }

        self.execution.set_phase(phase).await;
        self.projector.project(&self.execution.id, phase).await;
        self.record(event).await
    }

    /// Returns a value computed once and recorded in history.
    ///
    /// On replay `f` is not called and the recorded value is returned.
    pub async fn side_effect<T, F>(&mut self, f: F) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.replay.pop_front() {
            Some(HistoryEvent::SideEffectRecorded { value }) => {
                return serde_json::from_value(value)
                    .map_err(|e| WorkflowError::Storage(StoreError::Codec(e.to_string())));
            }
            Some(other) => return Err(self.mismatch("SideEffectRecorded", &other)),
            None => {}
        }

        let value = f();
        let recorded = serde_json::to_value(&value)
            .map_err(|e| WorkflowError::Storage(StoreError::Codec(e.to_string())))?;
        self.record(HistoryEvent::SideEffectRecorded { value: recorded })
            .await?;
        Ok(value)
    }

    /// Wall clock time in milliseconds since the Unix epoch, recorded once.
    pub async fn now(&mut self) -> Result<u64, WorkflowError> {
        self.side_effect(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or_default()
        })
        .await
    }

    /// Random number, recorded once.
    pub async fn random_u64(&mut self) -> Result<u64, WorkflowError> {
        self.side_effect(rand::random::<u64>).await
    }

    /// Suspends until a language is available or cancellation is requested.
    pub async fn wait_for_language(&mut self) -> Result<LanguageCode, WorkflowError> {
        let execution = self.execution.clone();
        loop {
            if let Some(language_code) = execution.state.lock().await.language_code {
                return Ok(language_code);
            }

            tokio::select! {
                _ = execution.language_signal.notified() => {}
                _ = execution.cancellation.cancelled() => {
                    info!(workflow_id = %execution.id, "Cancelled while waiting for langageCode");
                    return Err(WorkflowError::Cancelled(execution.id.clone()));
                }
            }
        }
    }

    /// Takes the current language for the remote call.
    ///
    /// Signals received after this point are recorded but no longer change
    /// the language.
    pub async fn commit_language(&mut self) -> Result<LanguageCode, WorkflowError> {
        let execution = self.execution.clone();
        let mut state = execution.state.lock().await;
        let language_code = state.language_code.ok_or_else(|| {
            WorkflowError::Configuration(format!("no langageCode to commit for {}", execution.id))
        })?;
        state.committed = true;

        let event = HistoryEvent::ActivityScheduled {
            activity: TRANSLATE_HELLO.to_string(),
            language_code,
        };
        if !self.replay_matches(&event)? {
            if execution.cancellation.is_cancelled() {
                return Err(WorkflowError::Cancelled(execution.id.clone()));
            }
            self.record(event).await?;
        }
        Ok(language_code)
    }

    /// Translates "hello" into `language_code`, retrying transient failures.
    pub async fn execute_activity(
        &mut self,
        language_code: LanguageCode,
    ) -> Result<String, WorkflowError> {
        match self.replay.pop_front() {
            Some(HistoryEvent::ActivityCompleted { result }) => return Ok(result),
            Some(HistoryEvent::ActivityFailed { error }) => return Err(self.activity_error(error)),
            Some(other) => return Err(self.mismatch("ActivityCompleted", &other)),
            None => {}
        }

        info!(
            workflow_id = %self.execution.id,
            task_queue = %self.activity_task_queue,
            "Scheduling {} for langageCode {}", TRANSLATE_HELLO, language_code
        );

        let activity = self.activity.clone();
        let outcome = self
            .invoker
            .invoke(TRANSLATE_HELLO, &self.execution.cancellation, |ctx| {
                let activity = activity.clone();
                async move { activity.translate_hello(ctx, language_code).await }
            })
            .await;

        let event = match &outcome {
            Ok(result) => HistoryEvent::ActivityCompleted {
                result: result.clone(),
            },
            Err(error) => HistoryEvent::ActivityFailed {
                error: error.clone(),
            },
        };
        self.record(event).await?;

        outcome.map_err(|e| self.activity_error(e))
    }

    fn activity_error(&self, error: ActivityError) -> WorkflowError {
        match error {
            ActivityError::Cancelled { .. } => WorkflowError::Cancelled(self.execution.id.clone()),
            other => WorkflowError::ActivityFailed(other),
        }
    }

    /// Records the outcome and releases everyone awaiting the result.
    pub(crate) async fn complete(&mut self, outcome: Result<HelloResponse, WorkflowError>) {
        let event = match &outcome {
            Ok(response) => HistoryEvent::WorkflowCompleted {
                response: response.clone(),
            },
            Err(error) => HistoryEvent::WorkflowFailed {
                error: error.clone(),
            },
        };

        let execution = self.execution.clone();
        let mut state = execution.state.lock().await;
        if let Err(e) = execution.history.append(&execution.id, event).await {
            error!(workflow_id = %execution.id, "Failed to record outcome: {}", e);
        }
        match &outcome {
            Ok(response) => info!(workflow_id = %execution.id, "Workflow completed: {}", response.message),
            Err(e) => info!(workflow_id = %execution.id, "Workflow ended in error: {}", e),
        }
        execution.finish(&mut state, outcome);
    }
}

impl fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow_id", &self.execution.id)
            .field("replay_remaining", &self.replay.len())
            .finish()
    }
}
