//! Registry of hello executions hosted by a worker.

use crate::activity::{HelloTranslationActivity, TranslationActivity};
use crate::context::WorkflowContext;
use crate::invoker::RemoteCallInvoker;
use crate::options::WorkerOptions;
use crate::projector::{StatusProjector, STATUS_SEARCH_ATTRIBUTE};
use crate::store::{InMemoryHistoryStore, InMemorySearchAttributeIndex};
use crate::workflow::{Execution, HelloWorkflow};
use aisatsu_core::{
    ExecutionFilter, ExecutionInfo, HelloRequest, HelloResponse, HistoryEvent, HistoryStore,
    LanguageCode, Phase, SearchAttributeIndex, WorkflowError, WorkflowId,
};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::AbortHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Starts, looks up and recovers hello executions.
///
/// Executions run as tokio tasks. Their history is written to the
/// [`HistoryStore`], which is the only state a new registry needs to resume
/// them after a restart.
///
/// # Examples
///
/// ```
/// use aisatsu::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), WorkflowError> {
/// let registry = WorkflowRegistry::builder().build()?;
///
/// let id = registry
///     .start(HelloRequest::new("Ada", Some(LanguageCode::Fr)))
///     .await?;
/// let response = registry.handle(&id).await?.result().await?;
///
/// assert_eq!(response.message, "Bonjour Ada !");
/// assert_eq!(registry.query_status(&id).await?, Phase::Completed);
/// # Ok(())
/// # }
/// ```
pub struct WorkflowRegistry {
    options: WorkerOptions,
    history: Arc<dyn HistoryStore>,
    projector: StatusProjector,
    invoker: RemoteCallInvoker,
    activity: Arc<dyn TranslationActivity>,
    executions: RwLock<HashMap<WorkflowId, Arc<Execution>>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("options", &self.options)
            .field("history", &self.history)
            .field("activity", &self.activity)
            .finish()
    }
}

impl WorkflowRegistry {
    /// Creates a builder with in-memory defaults.
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder::new()
    }

    /// Options this registry was built with.
    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Starts an execution under a generated id and returns the id.
    ///
    /// The id is `hello-<name>-<uuid>`, with the name lowercased as given.
    pub async fn start(&self, input: HelloRequest) -> Result<WorkflowId, WorkflowError> {
        let id = WorkflowId::new(format!(
            "hello-{}-{}",
            input.name.to_lowercase(),
            Uuid::new_v4()
        ));
        let handle = self.start_with_id(id, input).await?;
        Ok(handle.id().clone())
    }

    /// Starts an execution under `id`.
    ///
    /// Fails with [`WorkflowError::AlreadyExists`] when `id` was used before,
    /// by this registry or by any worker sharing the history store.
    pub async fn start_with_id(
        &self,
        id: WorkflowId,
        input: HelloRequest,
    ) -> Result<WorkflowHandle, WorkflowError> {
        if input.name.trim().is_empty() {
            return Err(WorkflowError::Configuration(
                "name must not be blank".to_string(),
            ));
        }

        let mut executions = self.executions.write().await;
        self.history
            .create(
                &id,
                HistoryEvent::WorkflowStarted {
                    input: input.clone(),
                },
            )
            .await?;

        let execution = Arc::new(Execution::new(id.clone(), input, self.history.clone()));
        executions.insert(id.clone(), execution.clone());
        info!(
            workflow_id = %id,
            task_queue = %self.options.workflow_task_queue,
            "Started workflow"
        );
        self.spawn(execution.clone(), VecDeque::new()).await;

        Ok(WorkflowHandle { execution })
    }

    /// Returns a handle to `id`, resuming it from history if this registry
    /// has not seen it yet.
    pub async fn handle(&self, id: &WorkflowId) -> Result<WorkflowHandle, WorkflowError> {
        if let Some(execution) = self.executions.read().await.get(id) {
            return Ok(WorkflowHandle {
                execution: execution.clone(),
            });
        }

        let mut executions = self.executions.write().await;
        if let Some(execution) = executions.get(id) {
            return Ok(WorkflowHandle {
                execution: execution.clone(),
            });
        }
        let execution = self.restore(id).await?;
        executions.insert(id.clone(), execution.clone());
        Ok(WorkflowHandle { execution })
    }

    /// Delivers a language to `id`.
    pub async fn signal_language(
        &self,
        id: &WorkflowId,
        language_code: LanguageCode,
    ) -> Result<(), WorkflowError> {
        self.handle(id).await?.signal_language(language_code).await
    }

    /// Phase held by the execution itself.
    pub async fn query_status(&self, id: &WorkflowId) -> Result<Phase, WorkflowError> {
        Ok(self.handle(id).await?.query_status())
    }

    /// Phase published to the search attribute index.
    ///
    /// `Phase::Unknown` when nothing is indexed for `id` or the index cannot
    /// be read.
    pub async fn status(&self, id: &WorkflowId) -> Phase {
        self.projector.read(id).await
    }

    /// Executions selected by `filter` in the search attribute index.
    pub async fn list_executions(&self, filter: &ExecutionFilter) -> Vec<ExecutionInfo> {
        self.projector.list(filter).await
    }

    /// Executions whose projected status is `phase`.
    pub async fn executions_in_phase(&self, phase: Phase) -> Vec<WorkflowId> {
        let filter = ExecutionFilter::SearchAttribute {
            key: STATUS_SEARCH_ATTRIBUTE.to_string(),
            value: phase.to_string(),
        };
        self.list_executions(&filter)
            .await
            .into_iter()
            .map(|info| info.id)
            .collect()
    }

    /// Waits for the outcome of `id`.
    pub async fn result(
        &self,
        id: &WorkflowId,
    ) -> Result<Result<HelloResponse, WorkflowError>, WorkflowError> {
        Ok(self.handle(id).await?.result().await)
    }

    /// Requests cancellation of `id`. See [`WorkflowHandle::cancel`].
    pub async fn cancel(&self, id: &WorkflowId) -> Result<(), WorkflowError> {
        self.handle(id).await?.cancel().await
    }

    /// Resumes every execution recorded in the history store that this
    /// registry does not host yet.
    ///
    /// A history that cannot be restored is logged and reported in
    /// [`RecoveryReport::failed`]; the other executions are still resumed.
    /// Fails only when the store cannot list its executions.
    pub async fn recover(&self) -> Result<RecoveryReport, WorkflowError> {
        let ids = self.history.list_ids().await?;
        let mut executions = self.executions.write().await;
        let mut report = RecoveryReport::default();

        for id in ids {
            if executions.contains_key(&id) {
                continue;
            }
            let execution = match self.restore(&id).await {
                Ok(execution) => execution,
                Err(e) => {
                    error!(workflow_id = %id, "Failed to recover workflow: {}", e);
                    report.failed.push(id);
                    continue;
                }
            };
            if execution.is_finished() {
                report.finished += 1;
            } else {
                report.resumed += 1;
            }
            executions.insert(id, execution);
        }

        info!(
            resumed = report.resumed,
            finished = report.finished,
            failed = report.failed.len(),
            "Recovered workflows"
        );
        Ok(report)
    }

    /// Number of execution tasks still running on this registry.
    pub async fn running(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Stops every running execution without recording an outcome.
    ///
    /// Their history stays as it was, so another registry can resume them.
    /// Callers waiting on a result get
    /// [`StoreError::Unavailable`](aisatsu_core::StoreError::Unavailable).
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in &tasks {
            task.abort();
        }
        let executions: Vec<Arc<Execution>> = self
            .executions
            .write()
            .await
            .drain()
            .map(|(_, execution)| execution)
            .collect();
        for execution in &executions {
            execution.abandon("stopped by registry shutdown").await;
        }
        info!(stopped = tasks.len(), "Registry shut down");
    }

    async fn restore(&self, id: &WorkflowId) -> Result<Arc<Execution>, WorkflowError> {
        let events = self.history.read(id).await?;
        let (execution, replay) = Execution::restore(id.clone(), events, self.history.clone())?;
        let execution = Arc::new(execution);

        if execution.is_finished() {
            debug!(workflow_id = %id, "Loaded finished workflow");
        } else {
            info!(
                workflow_id = %id,
                replay = replay.len(),
                "Resuming workflow from history"
            );
            self.spawn(execution.clone(), replay).await;
        }
        Ok(execution)
    }

    async fn spawn(&self, execution: Arc<Execution>, replay: VecDeque<HistoryEvent>) {
        let ctx = WorkflowContext::new(
            execution,
            self.projector.clone(),
            self.invoker.clone(),
            self.activity.clone(),
            self.options.activity_task_queue.clone(),
            replay,
        );
        let task = tokio::spawn(HelloWorkflow::execute(ctx));
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(task.abort_handle());
    }
}

/// What [`WorkflowRegistry::recover`] found in the history store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Unfinished executions now running again.
    pub resumed: usize,
    /// Finished executions loaded for their result.
    pub finished: usize,
    /// Executions whose history could not be restored.
    pub failed: Vec<WorkflowId>,
}

/// Client handle to one execution.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    execution: Arc<Execution>,
}

impl WorkflowHandle {
    /// Identifier of the execution.
    pub fn id(&self) -> &WorkflowId {
        &self.execution.id
    }

    /// Input the execution was started with.
    pub fn input(&self) -> &HelloRequest {
        &self.execution.input
    }

    /// Delivers a language.
    ///
    /// Before the language is committed the last signal wins. Afterwards,
    /// and once the execution has finished, signals are accepted and ignored.
    pub async fn signal_language(&self, language_code: LanguageCode) -> Result<(), WorkflowError> {
        self.execution.signal_language(language_code).await
    }

    /// Current phase, read from the execution without blocking.
    pub fn query_status(&self) -> Phase {
        self.execution.phase()
    }

    /// Waits for the execution to finish.
    pub async fn result(&self) -> Result<HelloResponse, WorkflowError> {
        self.execution.result().await
    }

    /// Requests cancellation. A no-op once the execution has finished.
    ///
    /// A waiting execution stops at once. An activity attempt in flight is
    /// asked to stop and awaited, and no further attempt is made. The
    /// execution then ends in `Phase::Error` with
    /// [`WorkflowError::Cancelled`].
    pub async fn cancel(&self) -> Result<(), WorkflowError> {
        self.execution.cancel().await
    }
}

/// Builder for [`WorkflowRegistry`].
///
/// Unset stores default to the in-memory implementations and the activity
/// to [`HelloTranslationActivity`].
#[derive(Default)]
pub struct WorkflowRegistryBuilder {
    options: WorkerOptions,
    history: Option<Arc<dyn HistoryStore>>,
    search_attributes: Option<Arc<dyn SearchAttributeIndex>>,
    activity: Option<Arc<dyn TranslationActivity>>,
}

impl WorkflowRegistryBuilder {
    /// Creates a builder with in-memory defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker options.
    pub fn options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the durable history store.
    pub fn history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Sets the index receiving status projections.
    pub fn search_attribute_index(mut self, index: Arc<dyn SearchAttributeIndex>) -> Self {
        self.search_attributes = Some(index);
        self
    }

    /// Sets the translation activity.
    pub fn activity<A: TranslationActivity + 'static>(mut self, activity: A) -> Self {
        self.activity = Some(Arc::new(activity));
        self
    }

    /// Sets a translation activity shared with the caller.
    pub fn shared_activity(mut self, activity: Arc<dyn TranslationActivity>) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Validates the options and builds the registry.
    pub fn build(self) -> Result<WorkflowRegistry, WorkflowError> {
        let options = self.options;
        if options.activity_options.start_to_close_timeout.is_zero() {
            return Err(WorkflowError::Configuration(
                "start_to_close_timeout must be greater than zero".to_string(),
            ));
        }
        if options.projection_timeout.is_zero() {
            return Err(WorkflowError::Configuration(
                "projection_timeout must be greater than zero".to_string(),
            ));
        }
        if options.workflow_task_queue.is_empty() || options.activity_task_queue.is_empty() {
            return Err(WorkflowError::Configuration(
                "Task queue names must not be empty".to_string(),
            ));
        }

        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new()));
        let index = self
            .search_attributes
            .unwrap_or_else(|| Arc::new(InMemorySearchAttributeIndex::new()));
        let activity = self
            .activity
            .unwrap_or_else(|| Arc::new(HelloTranslationActivity::new()));

        Ok(WorkflowRegistry {
            projector: StatusProjector::new(index, options.projection_timeout),
            invoker: RemoteCallInvoker::new(options.activity_options.clone()),
            options,
            history,
            activity,
            executions: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }
}
