//! # Client Binary Entry Point
//!
//! Thin wrapper that wires the submission pipeline together and runs one
//! command.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin client -- --config config/client.toml analyze --image leaf.jpg
//! cargo run --bin client -- --config config/client.toml reports
//! ```
//!
//! With metrics:
//! ```bash
//! cargo run --bin client -- --config config/client.toml \
//!   --metrics-output ./metrics/client.json analyze --image leaf.jpg
//! ```
//!
//! `analyze` will:
//! 1. Load configuration from the specified TOML file
//! 2. Sign in: load the trial counter of the configured user
//! 3. Build the transport and the client core
//! 4. Run one submission attempt through the orchestrator
//! 5. Print the diagnosis and any warnings
//! 6. Export metrics to JSON (if metrics-output specified)

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use plant_doctor::client::{
    present, ClientCore, ClientMetrics, SubmissionOrchestrator, TransportSelector,
};
use plant_doctor::common::config::{ClientConfig, StoreConfig};
use plant_doctor::common::logging::init_logger;
use plant_doctor::processing::{format_file_size, ImageAsset};
use plant_doctor::store::{AnalysisStore, InMemoryStore, RestStore, Session};

/// Command-line arguments for the client binary
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    ///
    /// Example: config/client.toml
    #[arg(short, long)]
    config: String,

    /// Path to write metrics JSON output (optional)
    #[arg(long)]
    metrics_output: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Diagnose one plant image
    Analyze {
        /// Image file to upload
        #[arg(short, long)]
        image: PathBuf,

        /// Upload timeout in seconds (overrides [backend] timeout_secs)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List previous diagnoses, newest first
    Reports,
}

fn build_store(config: &ClientConfig) -> Arc<dyn AnalysisStore> {
    match &config.store {
        StoreConfig::Memory { initial_trials } => Arc::new(
            InMemoryStore::new().with_profile(&config.session.user_id, *initial_trials),
        ),
        StoreConfig::Rest { base_url, api_key } => Arc::new(
            RestStore::new(base_url, api_key)
                .with_access_token(config.session.access_token.clone()),
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logger();

    // Parse command-line arguments
    let args = Args::parse();

    // Load client configuration from TOML file
    let config = ClientConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;

    let store = build_store(&config);

    match args.command {
        Command::Reports => {
            let records = store.list_records(&config.session.user_id).await?;
            if records.is_empty() {
                println!("No analyses yet.");
            }
            for record in records {
                println!("── {} ──", record.created_at.format("%Y-%m-%d %H:%M"));
                println!("{}", present(&record.to_payload()));
            }
            Ok(())
        }
        Command::Analyze {
            image,
            timeout_secs,
        } => {
            let asset = ImageAsset::from_file(&image)?;
            println!(
                "Selected {} ({})",
                image.display(),
                format_file_size(asset.byte_len())
            );

            // Sign in
            let mut session = Session::establish(store.as_ref(), &config.session.user_id).await?;

            // Create the client core (handles the upload)
            let selector = TransportSelector::from_config(&config.backend);
            let core = Arc::new(ClientCore::new(config.session.user_id.clone(), selector));

            // Create the orchestrator (handles the attempt)
            let mut orchestrator = SubmissionOrchestrator::new(
                core,
                store.clone(),
                config.compression.clone(),
                config.submission.payload_ceiling_bytes,
            );

            // Initialize metrics if output path is specified
            let metrics = if args.metrics_output.is_some() {
                let m = Arc::new(std::sync::Mutex::new(ClientMetrics::new(
                    config.session.user_id.clone(),
                )));
                orchestrator = orchestrator.with_metrics(m.clone());
                Some(m)
            } else {
                None
            };

            let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.backend.timeout_secs));
            let result = orchestrator.submit(&mut session, asset, timeout).await;

            // Export metrics if enabled
            if let (Some(metrics), Some(output_path)) = (metrics, &args.metrics_output) {
                let metrics = metrics
                    .lock()
                    .map_err(|_| anyhow::anyhow!("metrics lock poisoned"))?;
                metrics.export_to_json(output_path)?;
                println!("Metrics exported to: {}", output_path);
            }

            let outcome = result?;

            println!();
            println!("{}", present(&outcome.payload));
            for warning in &outcome.warnings {
                println!("⚠️  {}", warning);
            }
            println!(
                "Trials remaining: {}",
                outcome.eligibility.trials_remaining
            );

            Ok(())
        }
    }
}
