//! # REST Store Adapter
//!
//! [`AnalysisStore`] over a PostgREST-compatible HTTP API.
//!
//! | Operation           | Request                                                      |
//! |---------------------|--------------------------------------------------------------|
//! | `insert_record`     | `POST /rest/v1/reports` with `Prefer: return=representation` |
//! | `list_records`      | `GET /rest/v1/reports?user_id=eq.<id>&order=created_at.desc` |
//! | `decrement_trials`  | `POST /rest/v1/rpc/decrement_trials` `{"user_id": <id>}`     |
//! | `fetch_eligibility` | `GET /rest/v1/profiles?id=eq.<id>&select=trials_remaining`   |
//!
//! Every request carries the project `apikey` header and a bearer token (the
//! user's access token when one is known, the api key otherwise).

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AnalysisRecord, AnalysisStore, EligibilityState, NewAnalysisRecord};
use crate::error::StoreError;

const REPORTS_TABLE: &str = "reports";
const PROFILES_TABLE: &str = "profiles";
const DECREMENT_PROCEDURE: &str = "decrement_trials";

/// HTTP-backed [`AnalysisStore`].
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct ProfileRow {
    trials_remaining: i64,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, access_token: Option<String>) -> Self {
        self.access_token = access_token;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.api_key);
        builder.header("apikey", &self.api_key).bearer_auth(token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| StoreError::Decode(format!("{}: {}", e, body)))
    }
}

#[async_trait]
impl AnalysisStore for RestStore {
    async fn insert_record(&self, record: &NewAnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        debug!("Inserting report for user {}", record.user_id);

        let request = self
            .client
            .post(self.url(REPORTS_TABLE))
            .header("Prefer", "return=representation")
            .json(record);

        let rows: Vec<AnalysisRecord> = Self::json(self.send(request).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".to_string()))
    }

    async fn list_records(&self, user_id: &str) -> Result<Vec<AnalysisRecord>, StoreError> {
        let request = self.client.get(self.url(REPORTS_TABLE)).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);

        Self::json(self.send(request).await?).await
    }

    async fn decrement_trials(&self, user_id: &str) -> Result<bool, StoreError> {
        let request = self
            .client
            .post(self.url(&format!("rpc/{}", DECREMENT_PROCEDURE)))
            .json(&serde_json::json!({ "user_id": user_id }));

        Self::json(self.send(request).await?).await
    }

    async fn fetch_eligibility(&self, user_id: &str) -> Result<EligibilityState, StoreError> {
        let request = self.client.get(self.url(PROFILES_TABLE)).query(&[
            ("select", "trials_remaining".to_string()),
            ("id", format!("eq.{}", user_id)),
        ]);

        let rows: Vec<ProfileRow> = Self::json(self.send(request).await?).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))?;

        Ok(EligibilityState {
            trials_remaining: u32::try_from(row.trials_remaining.max(0)).unwrap_or(u32::MAX),
        })
    }
}
