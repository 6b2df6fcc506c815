use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::common::config::{endpoint_from_env, load_config};

/// Configuration of the same-origin relay.
///
/// # Example TOML
///
/// ```toml
/// [server]
/// bind_address = "127.0.0.1:8080"
/// dev_proxy = true
///
/// [upstream]
/// webhook_url = "https://hooks.example.com/webhook/plant-analysis"
/// timeout_ms = 120000
///
/// [limits]
/// max_body_bytes = 10485760
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: ServerInfo,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub bind_address: String,
    /// Mount the `/api/n8n/*` development rewrite proxy
    #[serde(default)]
    pub dev_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Real analysis webhook; never sent to clients
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// Add the tunnel bypass header to forwarded requests
    #[serde(default = "default_true")]
    pub bypass_header: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_upstream_timeout_ms(),
            bypass_header: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ProxyConfig {
    /// Load the relay configuration; `ANALYSIS_WEBHOOK_URL` replaces
    /// `[upstream] webhook_url` when set.
    pub fn from_file(path: &str) -> Result<Self> {
        let mut config: ProxyConfig = load_config(path)?;

        if let Some(endpoint) = endpoint_from_env() {
            config.upstream.webhook_url = Some(endpoint);
        }

        Ok(config)
    }

    /// The configured webhook, if it is non-blank.
    pub fn webhook_url(&self) -> Option<&str> {
        self.upstream
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

fn default_upstream_timeout_ms() -> u64 {
    120_000
}

fn default_true() -> bool {
    true
}
