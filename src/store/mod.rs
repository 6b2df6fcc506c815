//! # Persistent Store
//!
//! Port to the row store that keeps analysis reports and per-user trial
//! counters. The pipeline only needs four operations: insert a report, list a
//! user's reports, run the atomic trial decrement, and read the remaining
//! trials.
//!
//! Each call is an independent transaction. Nothing spans an insert and a
//! decrement, so callers must be ready for one to succeed without the other.
//!
//! ## Adapters
//!
//! - [`memory::InMemoryStore`]: process-local tables
//! - [`rest::RestStore`]: PostgREST-compatible HTTP API

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::messages::DiagnosisPayload;
use crate::error::StoreError;

pub use memory::InMemoryStore;
pub use rest::RestStore;

/// Remaining usage credits for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityState {
    pub trials_remaining: u32,
}

impl EligibilityState {
    pub fn can_submit(&self) -> bool {
        self.trials_remaining > 0
    }
}

/// A report as it is written: the validated payload plus its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysisRecord {
    pub user_id: String,
    pub plant_name: String,
    pub disease: String,
    pub disease_detected: bool,
    pub description: String,
    pub prevention: Vec<String>,
    pub required_nutrients: Option<String>,
    pub recommended_treatment: Option<String>,
    pub growth_stage: Option<String>,
}

impl NewAnalysisRecord {
    pub fn from_payload(user_id: &str, payload: &DiagnosisPayload) -> Self {
        Self {
            user_id: user_id.to_string(),
            plant_name: payload.plant_name.clone(),
            disease: payload.disease.clone(),
            disease_detected: payload.disease_detected,
            description: payload.description.clone(),
            prevention: payload.prevention_steps.clone(),
            required_nutrients: payload.required_nutrients.clone(),
            recommended_treatment: payload.recommended_treatment.clone(),
            growth_stage: payload.growth_stage.clone(),
        }
    }
}

/// A persisted report. Write-once: never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub user_id: String,
    pub plant_name: String,
    pub disease: String,
    pub disease_detected: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
    #[serde(default)]
    pub required_nutrients: Option<String>,
    #[serde(default)]
    pub recommended_treatment: Option<String>,
    #[serde(default)]
    pub growth_stage: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Rebuild the diagnosis a stored report was made from.
    pub fn to_payload(&self) -> DiagnosisPayload {
        DiagnosisPayload {
            plant_name: self.plant_name.clone(),
            disease: self.disease.clone(),
            disease_detected: self.disease_detected,
            description: self.description.clone().unwrap_or_default(),
            prevention_steps: self.prevention.clone(),
            required_nutrients: self.required_nutrients.clone(),
            recommended_treatment: self.recommended_treatment.clone(),
            growth_stage: self.growth_stage.clone(),
        }
    }
}

/// Row store operations used by the submission pipeline.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Insert a report and return it as stored.
    async fn insert_record(&self, record: &NewAnalysisRecord) -> Result<AnalysisRecord, StoreError>;

    /// All reports of `user_id`, newest first.
    async fn list_records(&self, user_id: &str) -> Result<Vec<AnalysisRecord>, StoreError>;

    /// Atomically take one trial from `user_id`.
    ///
    /// Returns `Ok(false)` when the store refused (for instance because no
    /// trials were left).
    async fn decrement_trials(&self, user_id: &str) -> Result<bool, StoreError>;

    /// Current trial counter of `user_id`.
    async fn fetch_eligibility(&self, user_id: &str) -> Result<EligibilityState, StoreError>;
}

/// A signed-in user together with the last known trial counter.
///
/// The counter is a cache: it is read before a submission without touching
/// the store and replaced after a completed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub eligibility: EligibilityState,
}

impl Session {
    pub fn new(user_id: impl Into<String>, eligibility: EligibilityState) -> Self {
        Self {
            user_id: user_id.into(),
            eligibility,
        }
    }

    /// Sign-in step: load the profile counter for `user_id`.
    pub async fn establish(store: &dyn AnalysisStore, user_id: &str) -> Result<Self, StoreError> {
        let eligibility = store.fetch_eligibility(user_id).await?;
        Ok(Self::new(user_id, eligibility))
    }
}
