//! # Transport Selection
//!
//! Decides which of the three request paths an upload takes and builds the
//! outgoing request for it:
//!
//! | Mode           | URL                                                        |
//! |----------------|------------------------------------------------------------|
//! | `direct`       | the backend endpoint, unchanged                            |
//! | `local-proxy`  | `<origin><local_mount><endpoint path + query>`             |
//! | `server-proxy` | `<origin><server_proxy_path>`; the endpoint stays server side |
//!
//! The mode is an explicit value chosen once outside the pipeline. A missing
//! endpoint fails every mode before any network activity.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::config::BackendConfig;
use crate::common::messages::IMAGE_FIELD;
use crate::error::SubmissionError;
use crate::processing::ImageAsset;

/// Request path used to reach the analysis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// Talk to the backend endpoint directly
    #[default]
    Direct,
    /// Go through the development rewrite proxy mounted on the origin
    LocalProxy,
    /// Go through the same-origin relay route
    ServerProxy,
}

/// A fully resolved upload, ready to be dispatched.
#[derive(Debug)]
pub struct OutgoingRequest<'a> {
    pub url: Url,
    pub method: Method,
    /// Multipart field name of the single image part
    pub field_name: &'static str,
    pub image: &'a ImageAsset,
}

/// Builds upload requests for one configured mode.
#[derive(Debug, Clone)]
pub struct TransportSelector {
    mode: TransportMode,
    base_endpoint: Option<String>,
    origin: String,
    local_mount: String,
    server_proxy_path: String,
}

impl TransportSelector {
    pub fn new(mode: TransportMode, base_endpoint: Option<String>) -> Self {
        Self {
            mode,
            base_endpoint,
            origin: "http://localhost:8080".to_string(),
            local_mount: "/api/n8n".to_string(),
            server_proxy_path: "/api/webhook".to_string(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.mode, config.endpoint.clone())
            .with_origin(&config.origin)
            .with_local_mount(&config.local_mount)
            .with_server_proxy_path(&config.server_proxy_path)
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = origin.trim_end_matches('/').to_string();
        self
    }

    pub fn with_local_mount(mut self, mount: &str) -> Self {
        self.local_mount = normalise_path(mount);
        self
    }

    pub fn with_server_proxy_path(mut self, path: &str) -> Self {
        self.server_proxy_path = normalise_path(path);
        self
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Build the outgoing request for `image`.
    ///
    /// # Errors
    /// [`SubmissionError::Configuration`] when the endpoint is absent or blank,
    /// or when a URL cannot be formed from the configuration.
    pub fn build_request<'a>(
        &self,
        image: &'a ImageAsset,
    ) -> Result<OutgoingRequest<'a>, SubmissionError> {
        let url = self.resolve_url()?;

        Ok(OutgoingRequest {
            url,
            method: Method::POST,
            field_name: IMAGE_FIELD,
            image,
        })
    }

    /// Resolve the target URL without building a request.
    pub fn resolve_url(&self) -> Result<Url, SubmissionError> {
        let endpoint = self
            .base_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| {
                SubmissionError::Configuration("analysis endpoint is not configured".to_string())
            })?;

        let endpoint = Url::parse(endpoint).map_err(|e| {
            SubmissionError::Configuration(format!("invalid analysis endpoint: {}", e))
        })?;

        let target = match self.mode {
            TransportMode::Direct => return Ok(endpoint),
            TransportMode::LocalProxy => {
                let mut target = format!("{}{}{}", self.origin, self.local_mount, endpoint.path());
                if let Some(query) = endpoint.query() {
                    target.push('?');
                    target.push_str(query);
                }
                target
            }
            TransportMode::ServerProxy => format!("{}{}", self.origin, self.server_proxy_path),
        };

        Url::parse(&target).map_err(|e| {
            SubmissionError::Configuration(format!("invalid proxy origin '{}': {}", self.origin, e))
        })
    }
}

fn normalise_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
