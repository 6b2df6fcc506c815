//! # Same-Origin Relay
//!
//! HTTP routes that let a browser or CLI reach the analysis webhook without
//! knowing its address or tripping cross-origin checks.
//!
//! | Route              | Purpose                                                  |
//! |--------------------|----------------------------------------------------------|
//! | `POST /api/webhook`| Server proxy: re-sends the multipart upload to the webhook |
//! | `ANY /api/n8n/*`   | Development rewrite proxy (only with `dev_proxy = true`)  |
//! | `GET /api/health`  | Liveness document                                         |
//!
//! Backend replies are returned verbatim. Only failures of the relay itself
//! produce the `{success: false, error, details, status}` envelope.

use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        DefaultBodyLimit, Path, RawQuery, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use url::Url;

use super::config::ProxyConfig;
use super::multipart::parse_multipart;
use crate::common::messages::{ProxyErrorBody, BYPASS_HEADER};

pub const WEBHOOK_ROUTE: &str = "/api/webhook";
pub const DEV_PROXY_ROUTE: &str = "/api/n8n/*path";
pub const HEALTH_ROUTE: &str = "/api/health";

/// Relay failures, rendered as the JSON error envelope.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Webhook URL not configured")]
    NotConfigured,

    #[error("Invalid request body")]
    BadRequest(String),

    #[error("Payload too large")]
    PayloadTooLarge(String),

    #[error("Upstream request timed out")]
    Timeout(String),

    #[error("Analysis service unavailable")]
    Unavailable(String),

    #[error("Proxy request failed")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ProxyError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ProxyError::MethodNotAllowed => None,
            ProxyError::NotConfigured => {
                Some("Set ANALYSIS_WEBHOOK_URL or [upstream] webhook_url".to_string())
            }
            ProxyError::BadRequest(details)
            | ProxyError::PayloadTooLarge(details)
            | ProxyError::Timeout(details)
            | ProxyError::Unavailable(details)
            | ProxyError::Internal(details) => Some(details.clone()),
        }
    }

    fn from_upstream(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::Timeout(e.to_string())
        } else if e.is_connect() {
            ProxyError::Unavailable(e.to_string())
        } else {
            ProxyError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("❌ Relay failed: {} ({:?})", self, self.details());
        } else {
            warn!("⚠️  Relay rejected request: {}", self);
        }

        let body = ProxyErrorBody {
            success: false,
            error: self.to_string(),
            details: self.details(),
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

/// Shared state of the relay routes.
pub struct ProxyState {
    http: reqwest::Client,
    webhook_url: Option<String>,
    timeout: Duration,
    bypass_header: bool,
}

impl ProxyState {
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: webhook_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            timeout,
            bypass_header: true,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut state = Self::new(
            config.webhook_url().map(str::to_string),
            Duration::from_millis(config.upstream.timeout_ms),
        );
        state.bypass_header = config.upstream.bypass_header;
        state
    }

    fn webhook(&self) -> Result<&str, ProxyError> {
        self.webhook_url.as_deref().ok_or(ProxyError::NotConfigured)
    }

    fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.timeout(self.timeout);
        if self.bypass_header {
            request.header(BYPASS_HEADER, "true")
        } else {
            request
        }
    }
}

/// Build the relay router.
///
/// # Arguments
///
/// * `state` - Upstream address and client
/// * `max_body_bytes` - Request body limit for all routes
/// * `dev_proxy` - Mount the development rewrite proxy
pub fn router(state: Arc<ProxyState>, max_body_bytes: usize, dev_proxy: bool) -> Router {
    let mut app = Router::new()
        .route(
            WEBHOOK_ROUTE,
            post(webhook_handler).fallback(method_not_allowed),
        )
        .route(HEALTH_ROUTE, get(health_check));

    if dev_proxy {
        app = app.route(DEV_PROXY_ROUTE, any(dev_proxy_handler));
    }

    app.layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "plant-analysis-relay",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn method_not_allowed() -> ProxyError {
    ProxyError::MethodNotAllowed
}

async fn webhook_handler(
    State(state): State<Arc<ProxyState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ProxyError> {
    let target = state.webhook()?.to_string();

    let multipart = multipart.map_err(|e| ProxyError::BadRequest(e.body_text()))?;
    let parsed = parse_multipart(multipart).await?;

    info!(
        "📥 Relaying {} file(s), {} field(s), {} bytes",
        parsed.files.len(),
        parsed.fields.len(),
        parsed.total_bytes()
    );

    let form = parsed.into_form()?;
    let response = state
        .decorate(state.http.post(&target).multipart(form))
        .send()
        .await
        .map_err(ProxyError::from_upstream)?;

    passthrough(response).await
}

async fn dev_proxy_handler(
    State(state): State<Arc<ProxyState>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let target = rewrite_target(state.webhook()?, &path, query.as_deref())?;
    debug!("Dev proxy {} -> {}", method, target);

    let mut request = state.http.request(method, target).body(body);
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        request = request.header(CONTENT_TYPE, content_type.clone());
    }

    let response = state
        .decorate(request)
        .send()
        .await
        .map_err(ProxyError::from_upstream)?;

    passthrough(response).await
}

/// `<origin of webhook>/<path>?<query>`
fn rewrite_target(webhook: &str, path: &str, query: Option<&str>) -> Result<String, ProxyError> {
    let webhook = Url::parse(webhook)
        .map_err(|e| ProxyError::Internal(format!("invalid webhook URL: {}", e)))?;

    let mut target = format!(
        "{}/{}",
        webhook.origin().ascii_serialization(),
        path.trim_start_matches('/')
    );
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }

    Ok(target)
}

/// Copy status, content type and body of an upstream reply.
async fn passthrough(response: reqwest::Response) -> Result<Response, ProxyError> {
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| HeaderValue::from_str(value).ok());

    let body = response
        .bytes()
        .await
        .map_err(ProxyError::from_upstream)?;

    info!("✅ Upstream answered HTTP {} ({} bytes)", status.as_u16(), body.len());

    let mut reply = (status, body).into_response();
    if let Some(content_type) = content_type {
        reply.headers_mut().insert(CONTENT_TYPE, content_type);
    }

    Ok(reply)
}
