//! The hello workflow: wait for a language, translate, greet.

use crate::context::WorkflowContext;
use aisatsu_core::{
    HelloRequest, HelloResponse, HistoryEvent, HistoryStore, LanguageCode, Phase, StoreError,
    WorkflowError, WorkflowId,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) type Outcome = Result<HelloResponse, WorkflowError>;

/// State owned by one execution.
#[derive(Debug)]
pub(crate) struct LocalState {
    pub(crate) language_code: Option<LanguageCode>,
    /// Set once the run sequence took the language for the remote call.
    /// Signals received afterwards are recorded but ignored.
    pub(crate) committed: bool,
    pub(crate) phase: Phase,
    pub(crate) outcome: Option<Outcome>,
}

/// One execution of the hello workflow.
///
/// Signal delivery and the run sequence both mutate [`LocalState`] under
/// `state`, and append to history while holding it, so the recorded order is
/// the order in which they were applied.
#[derive(Debug)]
pub(crate) struct Execution {
    pub(crate) id: WorkflowId,
    pub(crate) input: HelloRequest,
    pub(crate) state: Mutex<LocalState>,
    pub(crate) language_signal: Notify,
    pub(crate) cancellation: CancellationToken,
    pub(crate) history: Arc<dyn HistoryStore>,
    phase: watch::Sender<Phase>,
    outcome: watch::Sender<Option<Outcome>>,
}

impl Execution {
    pub(crate) fn new(id: WorkflowId, input: HelloRequest, history: Arc<dyn HistoryStore>) -> Self {
        let (phase, _) = watch::channel(Phase::Initial);
        let (outcome, _) = watch::channel(None);
        let state = LocalState {
            language_code: input.language_code,
            committed: false,
            phase: Phase::Initial,
            outcome: None,
        };
        Self {
            id,
            input,
            state: Mutex::new(state),
            language_signal: Notify::new(),
            cancellation: CancellationToken::new(),
            history,
            phase,
            outcome,
        }
    }

    /// Rebuilds an execution from its recorded history.
    ///
    /// Returns the execution and the commands its run sequence must replay.
    pub(crate) fn restore(
        id: WorkflowId,
        events: Vec<HistoryEvent>,
        history: Arc<dyn HistoryStore>,
    ) -> Result<(Self, VecDeque<HistoryEvent>), WorkflowError> {
        let mut events = events.into_iter();
        let input = match events.next() {
            Some(HistoryEvent::WorkflowStarted { input }) => input,
            other => {
                return Err(WorkflowError::Storage(StoreError::Codec(format!(
                    "history of {} starts with {} instead of WorkflowStarted",
                    id,
                    other.as_ref().map(HistoryEvent::kind).unwrap_or("nothing")
                ))))
            }
        };

        let mut execution = Self::new(id, input, history);
        let mut replay = VecDeque::new();
        let state = execution.state.get_mut();

        for event in events {
            match &event {
                HistoryEvent::SignalReceived { language_code } if !state.committed => {
                    state.language_code = Some(*language_code);
                }
                HistoryEvent::ActivityScheduled { language_code, .. } => {
                    state.language_code = Some(*language_code);
                    state.committed = true;
                }
                HistoryEvent::SearchAttributeUpserted { value, .. } => {
                    if let Ok(phase) = value.parse::<Phase>() {
                        state.phase = phase;
                    }
                }
                HistoryEvent::CancelRequested => execution.cancellation.cancel(),
                HistoryEvent::WorkflowCompleted { response } => {
                    state.phase = Phase::Completed;
                    state.outcome = Some(Ok(response.clone()));
                }
                HistoryEvent::WorkflowFailed { error } => {
                    state.phase = Phase::Error;
                    state.outcome = Some(Err(error.clone()));
                }
                _ => {}
            }
            if event.is_command() {
                replay.push_back(event);
            }
        }

        execution.phase.send_replace(state.phase);
        execution.outcome.send_replace(state.outcome.clone());
        Ok((execution, replay))
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    pub(crate) fn apply_phase(&self, state: &mut LocalState, phase: Phase) {
        state.phase = phase;
        self.phase.send_replace(phase);
    }

    pub(crate) async fn set_phase(&self, phase: Phase) {
        let mut state = self.state.lock().await;
        self.apply_phase(&mut state, phase);
    }

    pub(crate) fn finish(&self, state: &mut LocalState, outcome: Outcome) {
        let phase = if outcome.is_ok() {
            Phase::Completed
        } else {
            Phase::Error
        };
        self.apply_phase(state, phase);
        state.outcome = Some(outcome.clone());
        self.outcome.send_replace(Some(outcome));
    }

    /// Releases waiters of an execution whose task was stopped.
    ///
    /// The outcome is local only: nothing is appended to history and the
    /// phase is left as it was, so another worker can still resume it.
    pub(crate) async fn abandon(&self, reason: &str) {
        let mut state = self.state.lock().await;
        if state.outcome.is_some() {
            return;
        }
        let outcome: Outcome = Err(WorkflowError::Storage(StoreError::Unavailable(format!(
            "execution {} {}",
            self.id, reason
        ))));
        state.outcome = Some(outcome.clone());
        self.outcome.send_replace(Some(outcome));
        debug!(workflow_id = %self.id, "Abandoned workflow: {}", reason);
    }

    pub(crate) async fn signal_language(
        &self,
        language_code: LanguageCode,
    ) -> Result<(), WorkflowError> {
        let mut state = self.state.lock().await;
        if state.outcome.is_some() {
            info!(
                workflow_id = %self.id,
                "Ignoring signal langageCode {} for finished workflow", language_code
            );
            return Ok(());
        }

        self.history
            .append(&self.id, HistoryEvent::SignalReceived { language_code })
            .await?;

        if state.committed {
            info!(
                workflow_id = %self.id,
                "Ignoring signal langageCode {} received after commit", language_code
            );
            return Ok(());
        }

        info!(workflow_id = %self.id, "Receive Signal langageCode : {}", language_code);
        state.language_code = Some(language_code);
        drop(state);
        self.language_signal.notify_one();
        Ok(())
    }

    pub(crate) async fn cancel(&self) -> Result<(), WorkflowError> {
        let state = self.state.lock().await;
        if state.outcome.is_some() || self.cancellation.is_cancelled() {
            return Ok(());
        }
        self.history
            .append(&self.id, HistoryEvent::CancelRequested)
            .await?;
        drop(state);
        info!(workflow_id = %self.id, "Cancellation requested");
        self.cancellation.cancel();
        Ok(())
    }

    pub(crate) async fn result(&self) -> Outcome {
        let mut receiver = self.outcome.subscribe();
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());
        match outcome {
            Ok(Some(outcome)) => outcome,
            _ => Err(WorkflowError::Storage(StoreError::Unavailable(format!(
                "execution {} stopped without an outcome",
                self.id
            )))),
        }
    }
}

/// Run sequence of the hello workflow.
///
/// 1. Without a language in the input, project `WAITING` and suspend until a
///    signal delivers one.
/// 2. Commit the language and call the translation activity.
/// 3. Project `COMPLETED` with `"<word> <name> !"`, or `ERROR` with the
///    terminal failure.
///
/// Every decision goes through [`WorkflowContext`], so running this again
/// over recorded history replays the same steps without repeating their
/// side effects.
#[derive(Debug)]
pub struct HelloWorkflow;

impl HelloWorkflow {
    /// Runs the sequence against `ctx` and returns the greeting.
    pub async fn run(ctx: &mut WorkflowContext) -> Result<HelloResponse, WorkflowError> {
        let name = ctx.input().name.clone();
        info!(workflow_id = %ctx.workflow_id(), "Say Hello To {}", name);
        ctx.upsert_phase(Phase::Initial).await?;

        if ctx.input().language_code.is_none() {
            let waiting_since = ctx.now().await?;
            info!(workflow_id = %ctx.workflow_id(), "Waiting Signal langageCode ...");
            ctx.upsert_phase(Phase::Waiting).await?;

            let language_code = ctx.wait_for_language().await?;
            let resumed_at = ctx.now().await?;
            info!(
                workflow_id = %ctx.workflow_id(),
                "Resuming with langageCode {} after {}ms",
                language_code,
                resumed_at.saturating_sub(waiting_since)
            );
        }

        let language_code = ctx.commit_language().await?;
        let word = ctx.execute_activity(language_code).await?;
        let response = HelloResponse::greeting(&word, &name);

        ctx.upsert_phase(Phase::Completed).await?;
        Ok(response)
    }

    /// Runs the sequence to its end and records the outcome.
    pub(crate) async fn execute(mut ctx: WorkflowContext) {
        let outcome = Self::run(&mut ctx).await;

        if let Err(e) = &outcome {
            error!(workflow_id = %ctx.workflow_id(), "Workflow failed: {}", e);
            if !matches!(e, WorkflowError::NonDeterministic { .. }) {
                if let Err(e) = ctx.upsert_phase(Phase::Error).await {
                    warn!(workflow_id = %ctx.workflow_id(), "Could not record ERROR phase: {}", e);
                }
            }
        }

        ctx.complete(outcome).await;
    }
}
