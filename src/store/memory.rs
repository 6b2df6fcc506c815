//! Process-local store: two mutex-guarded tables (`reports` and `profiles`).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{AnalysisRecord, AnalysisStore, EligibilityState, NewAnalysisRecord};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    reports: Vec<AnalysisRecord>,
    profiles: HashMap<String, u32>,
}

/// In-memory [`AnalysisStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or reset the profile of `user_id`.
    pub fn with_profile(self, user_id: &str, trials_remaining: u32) -> Self {
        self.set_trials(user_id, trials_remaining);
        self
    }

    pub fn set_trials(&self, user_id: &str, trials_remaining: u32) {
        let mut tables = self.lock();
        tables.profiles.insert(user_id.to_string(), trials_remaining);
    }

    pub fn record_count(&self) -> usize {
        self.lock().reports.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // Mutations are single push/insert calls, so poisoned tables are still consistent.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn insert_record(&self, record: &NewAnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        let stored = AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id.clone(),
            plant_name: record.plant_name.clone(),
            disease: record.disease.clone(),
            disease_detected: record.disease_detected,
            description: Some(record.description.clone()),
            prevention: record.prevention.clone(),
            required_nutrients: record.required_nutrients.clone(),
            recommended_treatment: record.recommended_treatment.clone(),
            growth_stage: record.growth_stage.clone(),
            image_url: None,
            created_at: Utc::now(),
        };

        self.lock().reports.push(stored.clone());
        Ok(stored)
    }

    async fn list_records(&self, user_id: &str) -> Result<Vec<AnalysisRecord>, StoreError> {
        let tables = self.lock();
        let mut records: Vec<AnalysisRecord> = tables
            .reports
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();

        // Insertion order breaks ties between equal timestamps.
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn decrement_trials(&self, user_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.profiles.get_mut(user_id) {
            Some(trials) if *trials > 0 => {
                *trials -= 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::UnknownUser(user_id.to_string())),
        }
    }

    async fn fetch_eligibility(&self, user_id: &str) -> Result<EligibilityState, StoreError> {
        self.lock()
            .profiles
            .get(user_id)
            .map(|&trials_remaining| EligibilityState { trials_remaining })
            .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
    }
}
