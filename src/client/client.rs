//! # Client Core
//!
//! This module contains the minimal core client that uploads one image to the
//! analysis backend and returns the raw reply.
//!
//! ## Responsibility
//!
//! The [`ClientCore`] struct does a single thing:
//! - Ask the [`TransportSelector`] for the target URL
//! - Send a multipart body with one `image` part
//! - Hand back the status code and body text
//!
//! ## Design Philosophy
//!
//! This core component is stateless. It does not handle:
//! - Eligibility checks
//! - Compression
//! - Timeouts (the caller wraps the call)
//! - Response validation
//! - Persistence or credit bookkeeping
//!
//! Those concerns are delegated to the
//! [`SubmissionOrchestrator`](super::orchestrator::SubmissionOrchestrator), which
//! talks to the core through the [`AnalysisBackend`] trait.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plant_doctor::client::{ClientCore, TransportMode, TransportSelector};
//!
//! let selector = TransportSelector::new(TransportMode::Direct, Some(endpoint));
//! let core = ClientCore::new("cli".to_string(), selector);
//!
//! let reply = core.analyze(&asset).await?;
//! ```

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::transport::TransportSelector;
use crate::common::messages::ProxyErrorBody;
use crate::error::{SubmissionError, TransportError};
use crate::processing::ImageAsset;

/// Status and body of a backend reply that made it back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub status: u16,
    pub body: String,
}

/// Anything that can run an analysis upload.
///
/// Implementations must not retry internally; a failed upload is reported
/// once and the whole attempt is retried by the caller if at all.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Fail fast on configuration problems, before any work is done.
    fn preflight(&self) -> Result<(), SubmissionError> {
        Ok(())
    }

    /// Upload `image` and return the reply.
    ///
    /// # Errors
    /// - [`SubmissionError::Configuration`] when no request can be built
    /// - [`SubmissionError::TransportFailed`] on network failure or a non-2xx status
    async fn analyze(&self, image: &ImageAsset) -> Result<BackendReply, SubmissionError>;
}

/// The minimal HTTP client that performs the upload.
///
/// # Fields
///
/// * `client_name` - Identifier used in logs
/// * `http` - Shared connection pool
/// * `selector` - Decides where the upload goes
pub struct ClientCore {
    /// Identifier used in log lines
    client_name: String,
    http: Client,
    selector: TransportSelector,
}

impl ClientCore {
    /// Creates a new `ClientCore` for the given transport configuration.
    ///
    /// # Arguments
    ///
    /// * `client_name` - Identifier used in logs
    /// * `selector` - Transport path and endpoint, resolved once by the caller
    pub fn new(client_name: String, selector: TransportSelector) -> Self {
        Self {
            client_name,
            http: Client::new(),
            selector,
        }
    }

    pub fn selector(&self) -> &TransportSelector {
        &self.selector
    }
}

#[async_trait]
impl AnalysisBackend for ClientCore {
    fn preflight(&self) -> Result<(), SubmissionError> {
        self.selector.resolve_url().map(|_| ())
    }

    /// Sends the image as a single multipart part and reads the reply body.
    ///
    /// Dropping the returned future cancels the upload and releases the
    /// connection; this is how the caller's timeout takes effect.
    async fn analyze(&self, image: &ImageAsset) -> Result<BackendReply, SubmissionError> {
        let request = self.selector.build_request(image)?;

        info!(
            "📤 {} Uploading {} ({} bytes, {}) via {:?}",
            self.client_name,
            image.file_name().unwrap_or("image"),
            image.byte_len(),
            image.mime_type(),
            self.selector.mode()
        );
        debug!("Upload target: {}", request.url);

        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().unwrap_or("image.jpg").to_string())
            .mime_str(image.mime_type())
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let form = Form::new().part(request.field_name, part);

        let response = self
            .http
            .request(request.method, request.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            warn!(
                "❌ {} Backend answered HTTP {}",
                self.client_name,
                status.as_u16()
            );

            // Failures relayed by the same-origin proxy carry a readable reason.
            if let Some(proxy_error) = ProxyErrorBody::from_body(&body) {
                let message = match proxy_error.details {
                    Some(details) => format!("{}: {}", proxy_error.error, details),
                    None => proxy_error.error,
                };
                return Err(SubmissionError::TransportFailed {
                    status: Some(status.as_u16()),
                    message,
                });
            }

            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        info!(
            "✅ {} Received {} byte reply (HTTP {})",
            self.client_name,
            body.len(),
            status.as_u16()
        );

        Ok(BackendReply {
            status: status.as_u16(),
            body,
        })
    }
}
