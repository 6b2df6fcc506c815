//! # Configuration Utilities
//!
//! Shared configuration structures and parsing utilities used by the client
//! binary and the submission pipeline.
//!
//! Configuration is resolved once, at process start, and then passed by value
//! into the components that need it. Nothing below the binaries reads the
//! environment.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

use crate::client::transport::TransportMode;
use crate::processing::CompressionConfig;

/// Environment variable that overrides `[backend] endpoint`.
pub const ENDPOINT_ENV: &str = "ANALYSIS_WEBHOOK_URL";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/client.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Read the backend endpoint override from the process environment
/// (a `.env` file in the working directory is honoured).
///
/// Blank values are treated as unset.
pub fn endpoint_from_env() -> Option<String> {
    dotenv::dotenv().ok();

    env::var(ENDPOINT_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Complete client configuration.
///
/// # Example TOML
///
/// ```toml
/// [session]
/// user_id = "3f6c0a52-6b1e-4d1b-9a53-0c4f3f1b2a10"
///
/// [backend]
/// endpoint = "https://hooks.example.com/webhook/plant-analysis"
/// mode = "direct"
/// timeout_secs = 60
///
/// [compression]
/// max_size_bytes = 1048576
/// max_width = 1920
/// max_height = 1080
/// initial_quality = 0.8
///
/// [submission]
/// payload_ceiling_bytes = 10485760
///
/// [store]
/// kind = "memory"
/// initial_trials = 5
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The signed-in user
    pub session: SessionConfig,
    /// Where and how uploads are sent
    pub backend: BackendConfig,
    /// Size reducer limits
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Per-attempt limits
    #[serde(default)]
    pub submission: SubmissionConfig,
    /// Row store holding reports and trial counters
    pub store: StoreConfig,
}

impl ClientConfig {
    /// Load the client configuration and resolve the backend endpoint.
    ///
    /// The [`ENDPOINT_ENV`] variable, when set, replaces `[backend] endpoint`.
    /// An endpoint that is still missing afterwards is not defaulted; the
    /// first submission fails with a configuration error instead.
    pub fn from_file(path: &str) -> Result<Self> {
        let mut config: ClientConfig = load_config(path)?;

        if let Some(endpoint) = endpoint_from_env() {
            config.backend.endpoint = Some(endpoint);
        }

        Ok(config)
    }
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user_id: String,
    /// Bearer token forwarded to the row store
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Analysis backend endpoint and transport path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Absolute URL of the analysis webhook
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Which request path to use (`direct`, `local-proxy`, `server-proxy`)
    #[serde(default)]
    pub mode: TransportMode,
    /// Origin serving the proxy routes (proxied modes only)
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Mount point of the development rewrite proxy
    #[serde(default = "default_local_mount")]
    pub local_mount: String,
    /// Path of the server-side proxy route
    #[serde(default = "default_server_proxy_path")]
    pub server_proxy_path: String,
    /// Upload timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Limits applied to a single submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Request body ceiling for an upload, multipart envelope included.
    /// Keep it equal to the relay's `[limits] max_body_bytes`.
    pub payload_ceiling_bytes: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            payload_ceiling_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Which store adapter to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local tables, seeded with one profile for the session user
    Memory {
        #[serde(default = "default_initial_trials")]
        initial_trials: u32,
    },
    /// PostgREST-compatible HTTP store
    Rest { base_url: String, api_key: String },
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_local_mount() -> String {
    "/api/n8n".to_string()
}

fn default_server_proxy_path() -> String {
    "/api/webhook".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_initial_trials() -> u32 {
    5
}
