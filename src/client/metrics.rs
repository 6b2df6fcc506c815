use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::FailureKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptMetric {
    pub attempt_id: String,
    pub start_time: i64, // milliseconds since epoch
    pub latency_ms: u64,
    pub success: bool,
    pub failure_reason: Option<FailureKind>,
    pub warnings: Vec<String>,
    pub uploaded_bytes: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total_attempts: usize,
    pub completed_attempts: usize,
    pub failed_attempts: usize,
    pub failure_rate: f64,

    // Latency statistics (milliseconds), completed attempts only
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub latency_avg_ms: f64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,

    // Average upload size of completed attempts
    pub avg_uploaded_bytes: f64,

    // Failure reasons breakdown
    pub failure_reasons: HashMap<String, usize>,

    // Warnings on completed attempts (credit not deducted, etc.)
    pub warnings: HashMap<String, usize>,
}

#[derive(Debug)]
pub struct ClientMetrics {
    client_name: String,
    start_time: Instant,
    attempts: Vec<AttemptMetric>,
}

impl ClientMetrics {
    pub fn new(client_name: String) -> Self {
        Self {
            client_name,
            start_time: Instant::now(),
            attempts: Vec::new(),
        }
    }

    pub fn record_attempt(
        &mut self,
        attempt_id: String,
        latency: Duration,
        failure_reason: Option<FailureKind>,
        warnings: Vec<String>,
        uploaded_bytes: Option<usize>,
    ) {
        self.attempts.push(AttemptMetric {
            attempt_id,
            start_time: chrono::Utc::now().timestamp_millis(),
            latency_ms: latency.as_millis() as u64,
            success: failure_reason.is_none(),
            failure_reason,
            warnings,
            uploaded_bytes,
        });
    }

    pub fn attempts(&self) -> &[AttemptMetric] {
        &self.attempts
    }

    pub fn aggregate(&self) -> AggregatedStats {
        let mut stats = AggregatedStats::default();

        if self.attempts.is_empty() {
            return stats;
        }

        stats.total_attempts = self.attempts.len();
        stats.completed_attempts = self.attempts.iter().filter(|a| a.success).count();
        stats.failed_attempts = stats.total_attempts - stats.completed_attempts;
        stats.failure_rate = (stats.failed_attempts as f64 / stats.total_attempts as f64) * 100.0;

        let mut latencies: Vec<u64> = self
            .attempts
            .iter()
            .filter(|a| a.success)
            .map(|a| a.latency_ms)
            .collect();

        if !latencies.is_empty() {
            latencies.sort_unstable();

            stats.latency_min_ms = latencies[0];
            stats.latency_max_ms = latencies[latencies.len() - 1];
            stats.latency_avg_ms =
                latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;

            stats.latency_p50_ms = percentile(&latencies, 50.0);
            stats.latency_p95_ms = percentile(&latencies, 95.0);
            stats.latency_p99_ms = percentile(&latencies, 99.0);
        }

        let uploads: Vec<usize> = self
            .attempts
            .iter()
            .filter(|a| a.success)
            .filter_map(|a| a.uploaded_bytes)
            .collect();
        if !uploads.is_empty() {
            stats.avg_uploaded_bytes = uploads.iter().sum::<usize>() as f64 / uploads.len() as f64;
        }

        for attempt in self.attempts.iter().filter(|a| !a.success) {
            if let Some(reason) = &attempt.failure_reason {
                *stats
                    .failure_reasons
                    .entry(format!("{:?}", reason))
                    .or_insert(0) += 1;
            }
        }

        for warning in self.attempts.iter().flat_map(|a| a.warnings.iter()) {
            *stats.warnings.entry(warning.clone()).or_insert(0) += 1;
        }

        stats
    }

    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let stats = self.aggregate();

        let output = serde_json::json!({
            "client_name": self.client_name,
            "session_duration_secs": self.start_time.elapsed().as_secs(),
            "aggregated_stats": stats,
            "attempts": self.attempts,
        });

        let json_string = serde_json::to_string_pretty(&output)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;

        Ok(())
    }
}

fn percentile(sorted_data: &[u64], percentile: f64) -> u64 {
    if sorted_data.is_empty() {
        return 0;
    }

    let index = (percentile / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[index.min(sorted_data.len() - 1)]
}
