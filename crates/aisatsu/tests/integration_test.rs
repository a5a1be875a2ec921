use aisatsu::prelude::*;
use aisatsu::{
    ExecutionInfo, HistoryEvent, HistoryStore, InMemoryHistoryStore, InMemorySearchAttributeIndex,
    ProjectionError, SearchAttributeIndex, StoreError, STATUS_SEARCH_ATTRIBUTE, TRANSLATE_HELLO,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

/// Reference translation that counts its attempts.
#[derive(Debug, Default)]
struct CountingActivity {
    calls: AtomicU32,
    inner: HelloTranslationActivity,
}

impl CountingActivity {
    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationActivity for CountingActivity {
    async fn translate_hello(
        &self,
        ctx: ActivityContext,
        language_code: LanguageCode,
    ) -> RemoteCallResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.translate_hello(ctx, language_code).await
    }
}

/// Fails with a retryable error until `succeed_on` is reached.
#[derive(Debug)]
struct FlakyActivity {
    calls: AtomicU32,
    succeed_on: u32,
}

#[async_trait]
impl TranslationActivity for FlakyActivity {
    async fn translate_hello(
        &self,
        ctx: ActivityContext,
        _language_code: LanguageCode,
    ) -> RemoteCallResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ctx.attempt() < self.succeed_on {
            RemoteCallResult::retryable("TranslateServiceUnavailable", "try again")
        } else {
            RemoteCallResult::Success("Hallo".to_string())
        }
    }
}

/// Runs until asked to stop.
#[derive(Debug, Default)]
struct BlockingActivity {
    started: AtomicBool,
    calls: AtomicU32,
}

#[async_trait]
impl TranslationActivity for BlockingActivity {
    async fn translate_hello(
        &self,
        ctx: ActivityContext,
        _language_code: LanguageCode,
    ) -> RemoteCallResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        ctx.cancelled().await;
        RemoteCallResult::retryable("Cancelled", "stopped on request")
    }
}

/// Holds its attempt until released.
#[derive(Debug, Default)]
struct GatedActivity {
    started: AtomicBool,
    release: Notify,
    inner: HelloTranslationActivity,
}

#[async_trait]
impl TranslationActivity for GatedActivity {
    async fn translate_hello(
        &self,
        ctx: ActivityContext,
        language_code: LanguageCode,
    ) -> RemoteCallResult<String> {
        self.started.store(true, Ordering::SeqCst);
        self.release.notified().await;
        self.inner.translate_hello(ctx, language_code).await
    }
}

#[derive(Debug)]
struct UnavailableIndex;

#[async_trait]
impl SearchAttributeIndex for UnavailableIndex {
    async fn upsert(&self, _: &WorkflowId, _: &str, _: &str) -> Result<(), ProjectionError> {
        Err(ProjectionError::Unavailable("index down".to_string()))
    }

    async fn get(&self, _: &WorkflowId, _: &str) -> Result<Option<String>, ProjectionError> {
        Err(ProjectionError::Unavailable("index down".to_string()))
    }

    async fn list(&self, _: &ExecutionFilter) -> Result<Vec<ExecutionInfo>, ProjectionError> {
        Err(ProjectionError::Unavailable("index down".to_string()))
    }
}

fn fast_retries(maximum_attempts: u32) -> WorkerOptions {
    let policy = RetryPolicy::new(
        Duration::from_millis(10),
        Duration::from_millis(10),
        1.0,
        maximum_attempts,
    )
    .expect("valid policy");
    WorkerOptions::default()
        .with_activity_options(ActivityOptions::default().with_retry_policy(policy))
}

async fn wait_for_status(registry: &WorkflowRegistry, id: &WorkflowId, phase: Phase) {
    timeout(Duration::from_secs(5), async {
        while registry.status(id).await != phase {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status reached in time");
}

async fn wait_for_event(
    history: &dyn HistoryStore,
    id: &WorkflowId,
    predicate: impl Fn(&HistoryEvent) -> bool,
) {
    timeout(Duration::from_secs(5), async {
        loop {
            let events = history.read(id).await.expect("history readable");
            if events.iter().any(&predicate) {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event recorded in time");
}

fn is_upsert_of(phase: Phase) -> impl Fn(&HistoryEvent) -> bool {
    move |event: &HistoryEvent| {
        matches!(
            event,
            HistoryEvent::SearchAttributeUpserted { value, .. } if value == phase.as_str()
        )
    }
}

#[tokio::test]
async fn test_waits_for_signal_then_greets() {
    let registry = WorkflowRegistry::builder().build().expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Ada", None))
        .await
        .expect("started");
    wait_for_status(&registry, &id, Phase::Waiting).await;
    assert_eq!(registry.query_status(&id).await, Ok(Phase::Waiting));

    registry
        .signal_language(&id, LanguageCode::Fr)
        .await
        .expect("signalled");

    let handle = registry.handle(&id).await.expect("known execution");
    let response = handle.result().await.expect("completed");
    assert_eq!(response.message, "Bonjour Ada !");
    assert_eq!(handle.query_status(), Phase::Completed);
    assert_eq!(registry.status(&id).await, Phase::Completed);
}

#[tokio::test]
async fn test_selector_in_input_skips_waiting() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let registry = WorkflowRegistry::builder()
        .history_store(history.clone())
        .build()
        .expect("valid registry");

    let handle = registry
        .start_with_id(
            WorkflowId::new("hello-carol"),
            HelloRequest::new("Carol", Some(LanguageCode::Es)),
        )
        .await
        .expect("started");
    let response = handle.result().await.expect("completed");
    assert_eq!(response.message, "Hola Carol !");

    let events = history.read(handle.id()).await.expect("history");
    assert!(!events.iter().any(is_upsert_of(Phase::Waiting)));
    assert!(events.iter().any(is_upsert_of(Phase::Initial)));
    assert!(events.iter().any(is_upsert_of(Phase::Completed)));
}

#[tokio::test]
async fn test_invalid_selector_ends_in_error_without_retry() {
    let activity = Arc::new(CountingActivity::default());
    let registry = WorkflowRegistry::builder()
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Bob", Some(LanguageCode::Wtf)))
        .await
        .expect("started");
    let result = registry.handle(&id).await.expect("known").result().await;

    match result {
        Err(WorkflowError::ActivityFailed(ActivityError::NonRetryable {
            failure, attempts, ..
        })) => {
            assert_eq!(failure.failure_type, "InvalidLangageCode");
            assert_eq!(attempts, 1);
        }
        other => panic!("Unexpected result: {:?}", other),
    }
    assert_eq!(activity.calls(), 1);
    assert_eq!(registry.query_status(&id).await, Ok(Phase::Error));
    assert_eq!(registry.status(&id).await, Phase::Error);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let activity = Arc::new(FlakyActivity {
        calls: AtomicU32::new(0),
        succeed_on: 3,
    });
    let registry = WorkflowRegistry::builder()
        .options(fast_retries(5))
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Dora", Some(LanguageCode::En)))
        .await
        .expect("started");
    let response = registry
        .result(&id)
        .await
        .expect("known")
        .expect("completed");

    assert_eq!(response.message, "Hallo Dora !");
    assert_eq!(activity.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausted_retries_end_in_error() {
    let activity = Arc::new(FlakyActivity {
        calls: AtomicU32::new(0),
        succeed_on: u32::MAX,
    });
    let registry = WorkflowRegistry::builder()
        .options(fast_retries(3))
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Eve", Some(LanguageCode::En)))
        .await
        .expect("started");
    let result = registry.result(&id).await.expect("known");

    assert!(matches!(
        result,
        Err(WorkflowError::ActivityFailed(ActivityError::RetriesExhausted {
            attempts: 3,
            ..
        }))
    ));
    assert_eq!(activity.calls.load(Ordering::SeqCst), 3);
    assert_eq!(registry.status(&id).await, Phase::Error);
}

#[tokio::test]
async fn test_late_signal_does_not_change_result() {
    let registry = WorkflowRegistry::builder().build().expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Bob", Some(LanguageCode::En)))
        .await
        .expect("started");
    let handle = registry.handle(&id).await.expect("known");
    let first = handle.result().await;

    handle
        .signal_language(LanguageCode::Fr)
        .await
        .expect("late signal accepted");

    assert_eq!(handle.result().await, first);
    assert_eq!(
        first.map(|response| response.message),
        Ok("Hello Bob !".to_string())
    );
    assert_eq!(handle.query_status(), Phase::Completed);
}

#[tokio::test]
async fn test_signal_during_attempt_keeps_committed_language() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let activity = Arc::new(GatedActivity::default());
    let registry = WorkflowRegistry::builder()
        .history_store(history.clone())
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Ada", None))
        .await
        .expect("started");
    wait_for_status(&registry, &id, Phase::Waiting).await;
    registry
        .signal_language(&id, LanguageCode::Fr)
        .await
        .expect("signalled");
    timeout(Duration::from_secs(5), async {
        while !activity.started.load(Ordering::SeqCst) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("attempt started");

    registry
        .signal_language(&id, LanguageCode::Es)
        .await
        .expect("signal during attempt accepted");
    wait_for_event(history.as_ref(), &id, |event: &HistoryEvent| {
        matches!(
            event,
            HistoryEvent::SignalReceived {
                language_code: LanguageCode::Es
            }
        )
    })
    .await;
    activity.release.notify_one();

    let response = registry
        .result(&id)
        .await
        .expect("known")
        .expect("completed");
    assert_eq!(response.message, "Bonjour Ada !");

    let events = history.read(&id).await.expect("history");
    let scheduled = events
        .iter()
        .position(|event| matches!(event, HistoryEvent::ActivityScheduled { .. }))
        .expect("activity scheduled");
    assert_eq!(
        events[scheduled],
        HistoryEvent::ActivityScheduled {
            activity: TRANSLATE_HELLO.to_string(),
            language_code: LanguageCode::Fr,
        }
    );
    assert!(events[scheduled..].contains(&HistoryEvent::SignalReceived {
        language_code: LanguageCode::Es
    }));
}

#[tokio::test]
async fn test_signal_after_error_does_not_change_result() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let registry = WorkflowRegistry::builder()
        .history_store(history.clone())
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Bob", Some(LanguageCode::Wtf)))
        .await
        .expect("started");
    let handle = registry.handle(&id).await.expect("known");
    let first = handle.result().await;
    assert!(matches!(first, Err(WorkflowError::ActivityFailed(_))));
    let recorded = history.read(&id).await.expect("history").len();

    handle
        .signal_language(LanguageCode::Fr)
        .await
        .expect("late signal accepted");

    assert_eq!(handle.result().await, first);
    assert_eq!(handle.query_status(), Phase::Error);
    assert_eq!(registry.status(&id).await, Phase::Error);
    assert_eq!(history.read(&id).await.expect("history").len(), recorded);
}

#[tokio::test]
async fn test_unknown_and_duplicate_ids() {
    let registry = WorkflowRegistry::builder().build().expect("valid registry");
    let unknown = WorkflowId::new("hello-nobody");

    assert_eq!(
        registry.query_status(&unknown).await,
        Err(WorkflowError::NotFound(unknown.clone()))
    );
    assert_eq!(
        registry.signal_language(&unknown, LanguageCode::Fr).await,
        Err(WorkflowError::NotFound(unknown.clone()))
    );

    let id = WorkflowId::new("hello-fixed");
    registry
        .start_with_id(id.clone(), HelloRequest::new("Ada", None))
        .await
        .expect("started");
    let duplicate = registry
        .start_with_id(id.clone(), HelloRequest::new("Ada", None))
        .await;
    assert!(matches!(duplicate, Err(WorkflowError::AlreadyExists(dup)) if dup == id));
}

#[tokio::test]
async fn test_recovered_waiting_execution_completes_without_reprojecting() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let index = Arc::new(InMemorySearchAttributeIndex::new());

    let first = WorkflowRegistry::builder()
        .history_store(history.clone())
        .search_attribute_index(index.clone())
        .build()
        .expect("valid registry");
    let id = first
        .start(HelloRequest::new("Ada", None))
        .await
        .expect("started");
    wait_for_event(history.as_ref(), &id, is_upsert_of(Phase::Waiting)).await;
    first.shutdown().await;
    assert_eq!(index.upsert_count(), 2);

    let activity = Arc::new(CountingActivity::default());
    let second = WorkflowRegistry::builder()
        .history_store(history.clone())
        .search_attribute_index(index.clone())
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");
    let report = second.recover().await.expect("recovered");
    assert_eq!(report.resumed, 1);
    assert_eq!(second.query_status(&id).await, Ok(Phase::Waiting));

    second
        .signal_language(&id, LanguageCode::Fr)
        .await
        .expect("signalled");
    let response = second
        .result(&id)
        .await
        .expect("known")
        .expect("completed");

    assert_eq!(response.message, "Bonjour Ada !");
    assert_eq!(activity.calls(), 1);
    // INITIAL and WAITING were projected once, before the restart
    assert_eq!(index.upsert_count(), 3);
    assert_eq!(second.status(&id).await, Phase::Completed);
}

#[tokio::test]
async fn test_recovered_finished_execution_is_not_rerun() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let index = Arc::new(InMemorySearchAttributeIndex::new());

    let first = WorkflowRegistry::builder()
        .history_store(history.clone())
        .search_attribute_index(index.clone())
        .build()
        .expect("valid registry");
    let id = first
        .start(HelloRequest::new("Ada", Some(LanguageCode::Fr)))
        .await
        .expect("started");
    let original = first.result(&id).await.expect("known");
    first.shutdown().await;
    let upserts = index.upsert_count();

    let activity = Arc::new(CountingActivity::default());
    let second = WorkflowRegistry::builder()
        .history_store(history)
        .search_attribute_index(index.clone())
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    assert_eq!(
        second.recover().await,
        Ok(RecoveryReport {
            resumed: 0,
            finished: 1,
            failed: vec![],
        })
    );
    assert_eq!(second.query_status(&id).await, Ok(Phase::Completed));
    assert_eq!(second.result(&id).await, Ok(original));
    assert_eq!(activity.calls(), 0);
    assert_eq!(index.upsert_count(), upserts);
}

#[tokio::test]
async fn test_unreadable_history_does_not_stop_recovery() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let bad = WorkflowId::new("a-bad");
    let good = WorkflowId::new("b-good");
    history
        .create(&bad, HistoryEvent::CancelRequested)
        .await
        .expect("created");
    history
        .create(
            &good,
            HistoryEvent::WorkflowStarted {
                input: HelloRequest::new("Ada", None),
            },
        )
        .await
        .expect("created");

    let registry = WorkflowRegistry::builder()
        .history_store(history)
        .build()
        .expect("valid registry");
    let report = registry.recover().await.expect("recovered");

    assert_eq!(report.resumed, 1);
    assert_eq!(report.finished, 0);
    assert_eq!(report.failed, vec![bad.clone()]);

    wait_for_status(&registry, &good, Phase::Waiting).await;
    registry
        .signal_language(&good, LanguageCode::Es)
        .await
        .expect("signalled");
    let response = registry
        .result(&good)
        .await
        .expect("known")
        .expect("completed");
    assert_eq!(response.message, "Hola Ada !");
}

#[tokio::test]
async fn test_shutdown_releases_waiting_callers() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let first = WorkflowRegistry::builder()
        .history_store(history.clone())
        .build()
        .expect("valid registry");
    let id = first
        .start(HelloRequest::new("Ada", None))
        .await
        .expect("started");
    let handle = first.handle(&id).await.expect("known");
    wait_for_event(history.as_ref(), &id, is_upsert_of(Phase::Waiting)).await;

    first.shutdown().await;
    let result = timeout(Duration::from_secs(2), handle.result())
        .await
        .expect("result released by shutdown");

    assert!(matches!(
        result,
        Err(WorkflowError::Storage(StoreError::Unavailable(_)))
    ));
    assert_eq!(handle.query_status(), Phase::Waiting);
    assert_eq!(first.running().await, 0);
    let events = history.read(&id).await.expect("history");
    assert!(!events.iter().any(HistoryEvent::is_terminal));

    let second = WorkflowRegistry::builder()
        .history_store(history)
        .build()
        .expect("valid registry");
    assert_eq!(second.recover().await.expect("recovered").resumed, 1);
    second
        .signal_language(&id, LanguageCode::Fr)
        .await
        .expect("signalled");
    let response = second
        .result(&id)
        .await
        .expect("known")
        .expect("completed");
    assert_eq!(response.message, "Bonjour Ada !");
}

#[tokio::test]
async fn test_interrupted_remote_call_is_attempted_again() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let id = WorkflowId::new("hello-ada");
    history
        .create(
            &id,
            HistoryEvent::WorkflowStarted {
                input: HelloRequest::new("Ada", Some(LanguageCode::Fr)),
            },
        )
        .await
        .expect("created");
    for event in [
        HistoryEvent::SearchAttributeUpserted {
            key: STATUS_SEARCH_ATTRIBUTE.to_string(),
            value: "INITIAL".to_string(),
        },
        HistoryEvent::ActivityScheduled {
            activity: "TranslateHello".to_string(),
            language_code: LanguageCode::Fr,
        },
    ] {
        history.append(&id, event).await.expect("appended");
    }

    let activity = Arc::new(CountingActivity::default());
    let registry = WorkflowRegistry::builder()
        .history_store(history)
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    let response = registry
        .result(&id)
        .await
        .expect("known")
        .expect("completed");
    assert_eq!(response.message, "Bonjour Ada !");
    assert_eq!(activity.calls(), 1);
}

#[tokio::test]
async fn test_diverging_history_fails_replay() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let id = WorkflowId::new("hello-ada");
    history
        .create(
            &id,
            HistoryEvent::WorkflowStarted {
                input: HelloRequest::new("Ada", Some(LanguageCode::Fr)),
            },
        )
        .await
        .expect("created");
    history
        .append(
            &id,
            HistoryEvent::SearchAttributeUpserted {
                key: STATUS_SEARCH_ATTRIBUTE.to_string(),
                value: "WAITING".to_string(),
            },
        )
        .await
        .expect("appended");

    let registry = WorkflowRegistry::builder()
        .history_store(history)
        .build()
        .expect("valid registry");
    let report = registry.recover().await.expect("recovered");
    assert_eq!(report.resumed, 1);

    let result = registry.result(&id).await.expect("known");
    assert!(matches!(
        result,
        Err(WorkflowError::NonDeterministic { .. })
    ));
    assert_eq!(registry.query_status(&id).await, Ok(Phase::Error));
}

#[tokio::test]
async fn test_cancel_while_waiting() {
    let registry = WorkflowRegistry::builder().build().expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Ada", None))
        .await
        .expect("started");
    wait_for_status(&registry, &id, Phase::Waiting).await;

    registry.cancel(&id).await.expect("cancel requested");
    let result = registry.result(&id).await.expect("known");

    assert_eq!(result, Err(WorkflowError::Cancelled(id.clone())));
    assert_eq!(registry.query_status(&id).await, Ok(Phase::Error));
    assert_eq!(registry.status(&id).await, Phase::Error);

    // cancelling a finished execution changes nothing
    registry.cancel(&id).await.expect("no-op");
    assert_eq!(registry.result(&id).await, Ok(result));
}

#[tokio::test]
async fn test_cancel_stops_attempt_in_flight() {
    let activity = Arc::new(BlockingActivity::default());
    let registry = WorkflowRegistry::builder()
        .shared_activity(activity.clone())
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Ada", Some(LanguageCode::Fr)))
        .await
        .expect("started");
    timeout(Duration::from_secs(5), async {
        while !activity.started.load(Ordering::SeqCst) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("attempt started");

    registry.cancel(&id).await.expect("cancel requested");
    let result = registry.result(&id).await.expect("known");

    assert_eq!(result, Err(WorkflowError::Cancelled(id.clone())));
    assert_eq!(activity.calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.query_status(&id).await, Ok(Phase::Error));
}

#[tokio::test]
async fn test_projection_failure_does_not_fail_execution() {
    let registry = WorkflowRegistry::builder()
        .search_attribute_index(Arc::new(UnavailableIndex))
        .build()
        .expect("valid registry");

    let id = registry
        .start(HelloRequest::new("Ada", Some(LanguageCode::En)))
        .await
        .expect("started");
    let response = registry
        .result(&id)
        .await
        .expect("known")
        .expect("completed");

    assert_eq!(response.message, "Hello Ada !");
    assert_eq!(registry.query_status(&id).await, Ok(Phase::Completed));
    assert_eq!(registry.status(&id).await, Phase::Unknown);
    assert!(registry.list_executions(&ExecutionFilter::All).await.is_empty());
}

#[tokio::test]
async fn test_list_executions_by_phase() {
    let registry = WorkflowRegistry::builder().build().expect("valid registry");

    let waiting = registry
        .start(HelloRequest::new("Ada", None))
        .await
        .expect("started");
    let done = registry
        .start(HelloRequest::new("Bob", Some(LanguageCode::Es)))
        .await
        .expect("started");
    registry.result(&done).await.expect("known").expect("completed");
    wait_for_status(&registry, &waiting, Phase::Waiting).await;

    assert_eq!(registry.executions_in_phase(Phase::Waiting).await, vec![waiting.clone()]);
    assert_eq!(registry.executions_in_phase(Phase::Completed).await, vec![done.clone()]);
    assert_eq!(
        registry
            .list_executions(&ExecutionFilter::All)
            .await
            .len(),
        2
    );

    let only_done = registry
        .list_executions(&ExecutionFilter::WorkflowId(done.clone()))
        .await;
    assert_eq!(only_done.len(), 1);
    assert_eq!(
        only_done[0]
            .search_attributes
            .get(STATUS_SEARCH_ATTRIBUTE)
            .map(String::as_str),
        Some("COMPLETED")
    );
}
