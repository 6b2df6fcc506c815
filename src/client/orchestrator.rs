//! # Submission Orchestrator
//!
//! This module coordinates one analysis attempt from a selected image to a
//! saved report and a spent usage credit.
//!
//! ## State Machine
//!
//! ```text
//! Idle -> Checking -> Compressing -> Submitting -> Validating
//!      -> Persisting -> Crediting -> Complete
//!
//! any non-terminal state -> Failed(kind)
//! ```
//!
//! | State       | Work                                             | Failure                      |
//! |-------------|--------------------------------------------------|------------------------------|
//! | Checking    | cached trial counter, transport preflight        | `QuotaExhausted`, `ConfigurationError` |
//! | Compressing | size reducer on a blocking thread, ceiling check | `PayloadTooLarge` (reducer errors fall back to the original) |
//! | Submitting  | upload under the caller's timeout                | `TransportFailed`, `TimedOut` |
//! | Validating  | parse the reply into a `DiagnosisPayload`        | `EmptyResponse`, `MalformedResponse`, `IncompleteResponse` |
//! | Persisting  | insert the report                                | `PersistenceFailed`          |
//! | Crediting   | atomic trial decrement                           | warning only (`CreditFailed`) |
//! | Complete    | refresh the trial counter, return the payload    | warning only (`StaleEligibility`) |
//!
//! ## Ordering
//!
//! A credit is spent if and only if a report was written for the attempt. The
//! decrement runs strictly after a successful insert, and the two are separate
//! store transactions. When the decrement fails the report stays, the payload
//! is still delivered and the problem is reported as a warning. Nothing is
//! retried here; retries are new attempts started by the caller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SubmissionOrchestrator::new(backend, store, compression, ceiling);
//! let mut session = Session::establish(store.as_ref(), "user-1").await?;
//!
//! let outcome = orchestrator
//!     .submit(&mut session, asset, Duration::from_secs(60))
//!     .await?;
//! println!("{}", outcome.payload.plant_name);
//! ```

use log::{error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use super::client::AnalysisBackend;
use super::metrics::ClientMetrics;
use crate::common::messages::{parse_diagnosis, DiagnosisPayload};
use crate::error::{FailureKind, SubmissionError};
use crate::processing::{reduce, CompressionConfig, ImageAsset};
use crate::store::{AnalysisRecord, AnalysisStore, EligibilityState, NewAnalysisRecord, Session};

/// Bytes of a request body reserved for multipart boundaries and part
/// headers around the image.
pub const MULTIPART_ENVELOPE_ALLOWANCE: usize = 16 * 1024;

/// States of a single submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Checking,
    Compressing,
    Submitting,
    Validating,
    Persisting,
    Crediting,
    Complete,
    Failed(FailureKind),
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Complete | SubmissionState::Failed(_))
    }
}

/// Problems that did not stop the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionWarning {
    /// The reducer failed; the original image was uploaded instead
    CompressionFailed(String),
    /// The report was saved but the trial was not deducted
    CreditFailed(String),
    /// The trial counter could not be re-read; the local copy was adjusted
    StaleEligibility(String),
}

impl SubmissionWarning {
    pub fn label(&self) -> &'static str {
        match self {
            SubmissionWarning::CompressionFailed(_) => "CompressionFailed",
            SubmissionWarning::CreditFailed(_) => "CreditFailed",
            SubmissionWarning::StaleEligibility(_) => "StaleEligibility",
        }
    }
}

impl fmt::Display for SubmissionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionWarning::CompressionFailed(reason) => {
                write!(f, "compression failed, original image was sent ({})", reason)
            }
            SubmissionWarning::CreditFailed(reason) => {
                write!(f, "analysis saved but the trial was not deducted ({})", reason)
            }
            SubmissionWarning::StaleEligibility(reason) => {
                write!(f, "remaining trials could not be refreshed ({})", reason)
            }
        }
    }
}

/// A completed attempt.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub attempt_id: Uuid,
    pub payload: DiagnosisPayload,
    pub record: AnalysisRecord,
    /// Trial counter after the attempt
    pub eligibility: EligibilityState,
    pub warnings: Vec<SubmissionWarning>,
    /// Every state the attempt went through, `Idle` first
    pub history: Vec<SubmissionState>,
    /// Size of the image that was actually uploaded
    pub uploaded_bytes: usize,
}

impl SubmissionOutcome {
    pub fn credit_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SubmissionWarning::CreditFailed(_)))
    }
}

/// An aborted attempt.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct SubmissionFailure {
    pub attempt_id: Uuid,
    pub error: SubmissionError,
    /// Every state the attempt went through, ending in `Failed`
    pub history: Vec<SubmissionState>,
}

impl SubmissionFailure {
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Bookkeeping for one attempt.
struct Attempt {
    id: Uuid,
    state: SubmissionState,
    history: Vec<SubmissionState>,
    warnings: Vec<SubmissionWarning>,
    uploaded_bytes: Option<usize>,
}

impl Attempt {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SubmissionState::Idle,
            history: vec![SubmissionState::Idle],
            warnings: Vec::new(),
            uploaded_bytes: None,
        }
    }

    fn enter(&mut self, next: SubmissionState) {
        debug_assert!(!self.state.is_terminal(), "attempt already finished");
        info!("Attempt {}: {:?} -> {:?}", short_id(&self.id), self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn warn(&mut self, warning: SubmissionWarning) {
        warn!("⚠️  Attempt {}: {}", short_id(&self.id), warning);
        self.warnings.push(warning);
    }
}

fn short_id(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Runs submission attempts against a backend and a store.
///
/// The orchestrator itself is long-lived and shareable; each call to
/// [`submit`](Self::submit) is an independent attempt with its own state.
/// Concurrent attempts are not deduplicated.
pub struct SubmissionOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<dyn AnalysisStore>,
    compression: CompressionConfig,
    /// Request body ceiling in bytes, envelope included
    payload_ceiling: usize,
    metrics: Option<Arc<Mutex<ClientMetrics>>>,
}

impl SubmissionOrchestrator {
    /// Creates a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `backend` - Performs the upload (usually a [`ClientCore`](super::client::ClientCore))
    /// * `store` - Row store for reports and trial counters
    /// * `compression` - Size reducer limits applied to every attempt
    /// * `payload_ceiling` - Largest request body the receiving side accepts,
    ///   normally the relay's `max_body_bytes`. Images are refused once they
    ///   leave less than [`MULTIPART_ENVELOPE_ALLOWANCE`] of it.
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<dyn AnalysisStore>,
        compression: CompressionConfig,
        payload_ceiling: usize,
    ) -> Self {
        Self {
            backend,
            store,
            compression,
            payload_ceiling,
            metrics: None,
        }
    }

    /// Record every attempt into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Mutex<ClientMetrics>>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs one complete attempt for `image`.
    ///
    /// # Arguments
    ///
    /// * `session` - Signed-in user; its trial counter is read first and refreshed on completion
    /// * `image` - The selected image
    /// * `timeout` - Upper bound for the upload round-trip
    ///
    /// # Returns
    ///
    /// * `Ok(SubmissionOutcome)` - A report was saved; warnings may be attached
    /// * `Err(SubmissionFailure)` - The attempt aborted; no credit was spent
    pub async fn submit(
        &self,
        session: &mut Session,
        image: ImageAsset,
        timeout: Duration,
    ) -> Result<SubmissionOutcome, SubmissionFailure> {
        let started = Instant::now();
        let mut attempt = Attempt::new();

        info!(
            "🌱 Attempt {} started for user {} ({} trial(s) left)",
            short_id(&attempt.id),
            session.user_id,
            session.eligibility.trials_remaining
        );

        let result = self.run(&mut attempt, session, image, timeout).await;

        match result {
            Ok((payload, record)) => {
                info!(
                    "✅ Attempt {} complete: {} / {} ({} trial(s) left)",
                    short_id(&attempt.id),
                    payload.plant_name,
                    payload.disease,
                    session.eligibility.trials_remaining
                );
                self.record_metrics(&attempt, started.elapsed(), None);

                Ok(SubmissionOutcome {
                    attempt_id: attempt.id,
                    payload,
                    record,
                    eligibility: session.eligibility,
                    uploaded_bytes: attempt.uploaded_bytes.unwrap_or_default(),
                    warnings: attempt.warnings,
                    history: attempt.history,
                })
            }
            Err(err) => {
                let kind = err.kind();
                attempt.enter(SubmissionState::Failed(kind));
                error!("❌ Attempt {} failed: {}", short_id(&attempt.id), err);
                if let Some(raw) = err.raw_payload() {
                    error!("Backend payload was: {}", raw);
                }
                self.record_metrics(&attempt, started.elapsed(), Some(kind));

                Err(SubmissionFailure {
                    attempt_id: attempt.id,
                    error: err,
                    history: attempt.history,
                })
            }
        }
    }

    async fn run(
        &self,
        attempt: &mut Attempt,
        session: &mut Session,
        image: ImageAsset,
        timeout: Duration,
    ) -> Result<(DiagnosisPayload, AnalysisRecord), SubmissionError> {
        // Step 1: Eligibility, from the cached counter only
        attempt.enter(SubmissionState::Checking);
        if !session.eligibility.can_submit() {
            return Err(SubmissionError::QuotaExhausted);
        }
        self.backend.preflight()?;

        // Step 2: Compression, falling back to the original image
        attempt.enter(SubmissionState::Compressing);
        let upload = self.compress(attempt, image).await?;
        attempt.uploaded_bytes = Some(upload.byte_len());

        // Step 3: Upload under the caller's timeout
        attempt.enter(SubmissionState::Submitting);
        let reply = match tokio::time::timeout(timeout, self.backend.analyze(&upload)).await {
            Ok(reply) => reply?,
            Err(_) => return Err(SubmissionError::TimedOut(timeout)),
        };

        // Step 4: Validation
        attempt.enter(SubmissionState::Validating);
        let payload = parse_diagnosis(&reply.body)?;

        // Step 5: Persist the report; a failure here leaves the credit untouched
        attempt.enter(SubmissionState::Persisting);
        let record = self
            .store
            .insert_record(&NewAnalysisRecord::from_payload(&session.user_id, &payload))
            .await?;

        // Step 6: Spend the credit, only now that the report exists
        attempt.enter(SubmissionState::Crediting);
        let credited = match self.store.decrement_trials(&session.user_id).await {
            Ok(true) => true,
            Ok(false) => {
                attempt.warn(SubmissionWarning::CreditFailed(
                    "store refused the decrement".to_string(),
                ));
                false
            }
            Err(e) => {
                attempt.warn(SubmissionWarning::CreditFailed(e.to_string()));
                false
            }
        };

        // Step 7: Refresh eligibility and hand the payload over
        attempt.enter(SubmissionState::Complete);
        match self.store.fetch_eligibility(&session.user_id).await {
            Ok(eligibility) => session.eligibility = eligibility,
            Err(e) => {
                if credited {
                    session.eligibility.trials_remaining =
                        session.eligibility.trials_remaining.saturating_sub(1);
                }
                attempt.warn(SubmissionWarning::StaleEligibility(e.to_string()));
            }
        }

        Ok((payload, record))
    }

    async fn compress(
        &self,
        attempt: &mut Attempt,
        image: ImageAsset,
    ) -> Result<ImageAsset, SubmissionError> {
        let config = self.compression.clone();
        let source = image.clone();

        // Decoding and re-encoding are CPU-bound
        let reduced = tokio::task::spawn_blocking(move || reduce(&source, &config)).await;

        let upload = match reduced {
            Ok(Ok(asset)) => asset,
            Ok(Err(e)) => {
                attempt.warn(SubmissionWarning::CompressionFailed(e.to_string()));
                image
            }
            Err(e) => {
                attempt.warn(SubmissionWarning::CompressionFailed(format!(
                    "compression task aborted: {}",
                    e
                )));
                image
            }
        };

        let limit = self.image_limit();
        if upload.byte_len() > limit {
            return Err(SubmissionError::PayloadTooLarge {
                size: upload.byte_len(),
                limit,
            });
        }

        Ok(upload)
    }

    /// Largest image that still fits the ceiling once wrapped in a form.
    pub fn image_limit(&self) -> usize {
        self.payload_ceiling.saturating_sub(MULTIPART_ENVELOPE_ALLOWANCE)
    }

    fn record_metrics(&self, attempt: &Attempt, latency: Duration, failure: Option<FailureKind>) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        if let Ok(mut metrics) = metrics.lock() {
            metrics.record_attempt(
                attempt.id.to_string(),
                latency,
                failure,
                attempt.warnings.iter().map(|w| w.label().to_string()).collect(),
                attempt.uploaded_bytes,
            );
        }
    }
}
