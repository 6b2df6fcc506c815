use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plant_doctor::client::{
    AnalysisBackend, BackendReply, ClientCore, ClientMetrics, SubmissionOrchestrator,
    SubmissionState, SubmissionWarning, TransportMode, TransportSelector,
    MULTIPART_ENVELOPE_ALLOWANCE,
};
use plant_doctor::error::{FailureKind, StoreError, SubmissionError};
use plant_doctor::processing::{CompressionConfig, ImageAsset};
use plant_doctor::store::{
    AnalysisRecord, AnalysisStore, EligibilityState, InMemoryStore, NewAnalysisRecord, Session,
};

const USER: &str = "user-1";

const DIAGNOSIS: &str = r#"{"output":{
    "plant_name":"Tomato",
    "disease":"Early blight",
    "disease_detected":true,
    "description":"Concentric brown lesions on older leaves.",
    "prevention":["Remove infected leaves: bag and discard them","Mulch around the base"]
}}"#;

// ============================================================================
// FAKES
// ============================================================================

enum Behaviour {
    Reply(&'static str),
    Fail(u16),
    Hang,
}

struct FakeBackend {
    behaviour: Behaviour,
    calls: AtomicUsize,
    uploaded: Mutex<Vec<usize>>,
}

impl FakeBackend {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            uploaded: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    async fn analyze(&self, image: &ImageAsset) -> Result<BackendReply, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.uploaded.lock().unwrap().push(image.byte_len());

        match self.behaviour {
            Behaviour::Reply(body) => Ok(BackendReply {
                status: 200,
                body: body.to_string(),
            }),
            Behaviour::Fail(status) => Err(SubmissionError::TransportFailed {
                status: Some(status),
                message: "bad gateway".to_string(),
            }),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(BackendReply {
                    status: 200,
                    body: String::new(),
                })
            }
        }
    }
}

/// In-memory store with switchable faults and a call log.
struct FaultyStore {
    inner: InMemoryStore,
    fail_insert: AtomicBool,
    refuse_decrement: AtomicBool,
    fail_decrement: AtomicBool,
    fail_fetch: AtomicBool,
    calls: Mutex<Vec<&'static str>>,
}

impl FaultyStore {
    fn new(trials: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStore::new().with_profile(USER, trials),
            fail_insert: AtomicBool::new(false),
            refuse_decrement: AtomicBool::new(false),
            fail_decrement: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    async fn trials(&self) -> u32 {
        self.inner.fetch_eligibility(USER).await.unwrap().trials_remaining
    }
}

#[async_trait]
impl AnalysisStore for FaultyStore {
    async fn insert_record(&self, record: &NewAnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        self.log("insert");
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert_record(record).await
    }

    async fn list_records(&self, user_id: &str) -> Result<Vec<AnalysisRecord>, StoreError> {
        self.log("list");
        self.inner.list_records(user_id).await
    }

    async fn decrement_trials(&self, user_id: &str) -> Result<bool, StoreError> {
        self.log("decrement");
        if self.refuse_decrement.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if self.fail_decrement.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("rpc gateway timeout".to_string()));
        }
        self.inner.decrement_trials(user_id).await
    }

    async fn fetch_eligibility(&self, user_id: &str) -> Result<EligibilityState, StoreError> {
        self.log("fetch");
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("timeout".to_string()));
        }
        self.inner.fetch_eligibility(user_id).await
    }
}

fn session(trials: u32) -> Session {
    Session::new(USER, EligibilityState { trials_remaining: trials })
}

fn small_image() -> ImageAsset {
    ImageAsset::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg", Some("leaf.jpg".into()))
}

fn orchestrator(backend: Arc<dyn AnalysisBackend>, store: Arc<FaultyStore>) -> SubmissionOrchestrator {
    SubmissionOrchestrator::new(backend, store, CompressionConfig::default(), 10 * 1024 * 1024)
}

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_successful_attempt_saves_then_credits() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    let mut session = session(3);

    let outcome = orchestrator(backend.clone(), store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap();

    assert_eq!(outcome.payload.plant_name, "Tomato");
    assert_eq!(outcome.payload.prevention_steps.len(), 2);
    assert_eq!(outcome.record.user_id, USER);
    assert_eq!(outcome.record.disease, "Early blight");
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.uploaded_bytes, 4);

    assert_eq!(
        outcome.history,
        vec![
            SubmissionState::Idle,
            SubmissionState::Checking,
            SubmissionState::Compressing,
            SubmissionState::Submitting,
            SubmissionState::Validating,
            SubmissionState::Persisting,
            SubmissionState::Crediting,
            SubmissionState::Complete,
        ]
    );

    // The decrement strictly follows the insert.
    assert_eq!(store.calls(), vec!["insert", "decrement", "fetch"]);
    assert_eq!(store.trials().await, 2);
    assert_eq!(session.eligibility.trials_remaining, 2);
    assert_eq!(outcome.eligibility.trials_remaining, 2);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_no_trials_left_short_circuits() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(0);
    let mut session = session(0);

    let failure = orchestrator(backend.clone(), store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::QuotaExhausted);
    assert_eq!(
        failure.history,
        vec![
            SubmissionState::Idle,
            SubmissionState::Checking,
            SubmissionState::Failed(FailureKind::QuotaExhausted),
        ]
    );
    assert_eq!(backend.calls(), 0);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_empty_reply_spends_nothing() {
    let backend = FakeBackend::new(Behaviour::Reply(""));
    let store = FaultyStore::new(3);
    let mut session = session(3);

    let failure = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::EmptyResponse);
    assert_eq!(
        failure.history.last(),
        Some(&SubmissionState::Failed(FailureKind::EmptyResponse))
    );
    assert!(store.calls().is_empty());
    assert_eq!(store.trials().await, 3);
    assert_eq!(session.eligibility.trials_remaining, 3);
}

#[tokio::test]
async fn test_incomplete_reply_names_missing_fields() {
    let backend = FakeBackend::new(Behaviour::Reply(r#"{"output":{"plant_name":"Tomato"}}"#));
    let store = FaultyStore::new(3);
    let mut session = session(3);

    let failure = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::IncompleteResponse);
    match &failure.error {
        SubmissionError::IncompleteResponse { missing, raw } => {
            assert!(missing.contains(&"disease".to_string()));
            assert!(raw.contains("Tomato"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(store.trials().await, 3);
}

#[tokio::test]
async fn test_refused_credit_still_delivers_payload() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    store.refuse_decrement.store(true, Ordering::SeqCst);
    let mut session = session(3);

    let outcome = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap();

    assert!(outcome.credit_failed());
    assert_eq!(outcome.payload.disease, "Early blight");
    assert_eq!(
        &outcome.history[outcome.history.len() - 2..],
        &[SubmissionState::Crediting, SubmissionState::Complete]
    );
    assert_eq!(store.inner.record_count(), 1);
    assert_eq!(store.trials().await, 3);
    assert_eq!(session.eligibility.trials_remaining, 3);
}

#[tokio::test]
async fn test_erroring_credit_still_delivers_payload() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    store.fail_decrement.store(true, Ordering::SeqCst);
    let mut session = session(3);

    let outcome = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap();

    assert!(outcome.credit_failed());
    match outcome.warnings.as_slice() {
        [SubmissionWarning::CreditFailed(reason)] => assert!(reason.contains("rpc gateway timeout")),
        other => panic!("unexpected warnings: {:?}", other),
    }
    assert_eq!(outcome.payload.plant_name, "Tomato");
    assert_eq!(outcome.history.last(), Some(&SubmissionState::Complete));
    assert_eq!(store.calls(), vec!["insert", "decrement", "fetch"]);
    assert_eq!(store.inner.record_count(), 1);
    assert_eq!(store.trials().await, 3);
    assert_eq!(session.eligibility.trials_remaining, 3);
}

#[tokio::test]
async fn test_failed_insert_leaves_credit_untouched() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    store.fail_insert.store(true, Ordering::SeqCst);
    let mut session = session(3);

    let failure = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::PersistenceFailed);
    assert_eq!(store.calls(), vec!["insert"]);
    assert_eq!(store.trials().await, 3);
    assert_eq!(store.inner.record_count(), 0);
}

#[tokio::test]
async fn test_transport_failure_keeps_status() {
    let backend = FakeBackend::new(Behaviour::Fail(502));
    let store = FaultyStore::new(3);
    let mut session = session(3);

    let failure = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        SubmissionError::TransportFailed {
            status: Some(502),
            ..
        }
    ));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = FakeBackend::new(Behaviour::Hang);
    let store = FaultyStore::new(3);
    let mut session = session(3);

    let failure = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), Duration::from_millis(50))
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::TimedOut);
    assert!(store.calls().is_empty());
    assert_eq!(store.trials().await, 3);
}

#[tokio::test]
async fn test_missing_endpoint_fails_before_any_work() {
    let core = Arc::new(ClientCore::new(
        "test".to_string(),
        TransportSelector::new(TransportMode::ServerProxy, Some("  ".to_string())),
    ));
    let store = FaultyStore::new(3);
    let mut session = session(3);

    let failure = orchestrator(core, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::ConfigurationError);
    assert_eq!(
        failure.history,
        vec![
            SubmissionState::Idle,
            SubmissionState::Checking,
            SubmissionState::Failed(FailureKind::ConfigurationError),
        ]
    );
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_undecodable_image_is_sent_as_is() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    let mut session = session(3);
    let garbage = ImageAsset::new(vec![0xAB; 4096], "image/heic", Some("leaf.heic".into()));

    let compression = CompressionConfig {
        max_size_bytes: 1024,
        ..CompressionConfig::default()
    };
    let orchestrator =
        SubmissionOrchestrator::new(backend.clone(), store.clone(), compression, 1024 * 1024);

    let outcome = orchestrator
        .submit(&mut session, garbage, TIMEOUT)
        .await
        .unwrap();

    assert!(matches!(
        outcome.warnings.as_slice(),
        [SubmissionWarning::CompressionFailed(_)]
    ));
    assert_eq!(outcome.uploaded_bytes, 4096);
    assert_eq!(*backend.uploaded.lock().unwrap(), vec![4096]);
    assert_eq!(store.trials().await, 2);
}

#[tokio::test]
async fn test_upload_over_ceiling_is_refused() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    let mut session = session(3);
    let garbage = ImageAsset::new(vec![0xAB; 4096], "image/jpeg", None);

    let compression = CompressionConfig {
        max_size_bytes: 1024,
        ..CompressionConfig::default()
    };
    let ceiling = MULTIPART_ENVELOPE_ALLOWANCE + 2048;
    let orchestrator =
        SubmissionOrchestrator::new(backend.clone(), store.clone(), compression, ceiling);
    assert_eq!(orchestrator.image_limit(), 2048);

    let failure = orchestrator
        .submit(&mut session, garbage, TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        SubmissionError::PayloadTooLarge {
            size: 4096,
            limit: 2048
        }
    ));
    assert_eq!(backend.calls(), 0);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_failed_refresh_adjusts_local_counter() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(3);
    store.fail_fetch.store(true, Ordering::SeqCst);
    let mut session = session(3);

    let outcome = orchestrator(backend, store.clone())
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap();

    assert!(matches!(
        outcome.warnings.as_slice(),
        [SubmissionWarning::StaleEligibility(_)]
    ));
    assert_eq!(session.eligibility.trials_remaining, 2);
    assert_eq!(store.trials().await, 2);
}

#[tokio::test]
async fn test_last_trial_is_spent_then_refused() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(1);
    let orchestrator = orchestrator(backend.clone(), store.clone());
    let mut session = Session::establish(store.as_ref(), USER).await.unwrap();

    orchestrator
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap();
    assert!(!session.eligibility.can_submit());

    let failure = orchestrator
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(failure.kind(), FailureKind::QuotaExhausted);
    assert_eq!(backend.calls(), 1);
    assert_eq!(store.inner.record_count(), 1);
}

#[tokio::test]
async fn test_attempts_are_recorded_in_metrics() {
    let backend = FakeBackend::new(Behaviour::Reply(DIAGNOSIS));
    let store = FaultyStore::new(1);
    let metrics = Arc::new(Mutex::new(ClientMetrics::new("test".to_string())));
    let orchestrator = orchestrator(backend, store).with_metrics(metrics.clone());
    let mut session = session(1);

    orchestrator
        .submit(&mut session, small_image(), TIMEOUT)
        .await
        .unwrap();
    let _ = orchestrator.submit(&mut session, small_image(), TIMEOUT).await;

    let stats = metrics.lock().unwrap().aggregate();
    assert_eq!(stats.total_attempts, 2);
    assert_eq!(stats.completed_attempts, 1);
    assert_eq!(stats.failure_reasons.get("QuotaExhausted"), Some(&1));
}
