//! Same-origin relay in front of the analysis webhook
//!
//! ```bash
//! cargo run --bin web_server -- --config config/proxy.toml
//! ```

use clap::Parser;
use log::{info, warn};
use std::sync::Arc;

use plant_doctor::common::logging::init_logger;
use plant_doctor::server::{router, ProxyConfig, ProxyState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the relay configuration file (TOML format)
    #[arg(short, long, default_value = "config/proxy.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();

    info!("🚀 Initializing relay...");

    let config = ProxyConfig::from_file(&args.config)?;
    if config.webhook_url().is_none() {
        warn!("⚠️  No webhook configured; uploads will be answered with HTTP 500");
    }

    let state = Arc::new(ProxyState::from_config(&config));
    let app = router(state, config.limits.max_body_bytes, config.server.dev_proxy);

    let addr = &config.server.bind_address;
    info!("🌐 Relay running on http://{}", addr);
    info!("📡 Upload endpoint: http://{}/api/webhook", addr);
    if config.server.dev_proxy {
        info!("🔧 Dev proxy mounted at http://{}/api/n8n/", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
