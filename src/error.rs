//! # Error Types
//!
//! Typed failures for every stage of a submission attempt. The orchestrator
//! surfaces exactly one [`SubmissionError`] per aborted attempt; recoverable
//! problems are reported as warnings on the successful outcome instead.

use std::time::Duration;
use thiserror::Error;

/// Failures of the size reducer.
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("image could not be encoded: {0}")]
    Encode(String),
}

/// Failures while picking up an image from disk.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a supported image")]
    NotAnImage(String),
}

/// Failures raised while talking to the analysis backend.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend answered with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("invalid request: {0}")]
    Request(String),
}

/// Failures reported by the persistent store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store rejected the operation: {0}")]
    Rejected(String),

    #[error("store returned an unreadable reply: {0}")]
    Decode(String),

    #[error("no profile found for user {0}")]
    UnknownUser(String),
}

/// Discriminant of a failed attempt, used by the `Failed` state and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    ConfigurationError,
    QuotaExhausted,
    PayloadTooLarge,
    TransportFailed,
    TimedOut,
    EmptyResponse,
    MalformedResponse,
    IncompleteResponse,
    PersistenceFailed,
}

/// The reason a submission attempt was aborted.
///
/// Every variant is retryable only by re-running the whole pipeline; the
/// core never resumes an attempt half way through.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no analyses remaining for this account")]
    QuotaExhausted,

    #[error("image is {size} bytes, above the {limit} byte ceiling")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("transport failed{}: {message}", status_suffix(.status))]
    TransportFailed {
        status: Option<u16>,
        message: String,
    },

    #[error("backend did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("backend returned an empty body")]
    EmptyResponse,

    #[error("backend returned unparseable data ({reason})")]
    MalformedResponse { reason: String, raw: String },

    #[error("backend response is missing required fields: {}", .missing.join(", "))]
    IncompleteResponse { missing: Vec<String>, raw: String },

    #[error("analysis could not be saved: {0}")]
    PersistenceFailed(#[from] StoreError),
}

impl SubmissionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubmissionError::Configuration(_) => FailureKind::ConfigurationError,
            SubmissionError::QuotaExhausted => FailureKind::QuotaExhausted,
            SubmissionError::PayloadTooLarge { .. } => FailureKind::PayloadTooLarge,
            SubmissionError::TransportFailed { .. } => FailureKind::TransportFailed,
            SubmissionError::TimedOut(_) => FailureKind::TimedOut,
            SubmissionError::EmptyResponse => FailureKind::EmptyResponse,
            SubmissionError::MalformedResponse { .. } => FailureKind::MalformedResponse,
            SubmissionError::IncompleteResponse { .. } => FailureKind::IncompleteResponse,
            SubmissionError::PersistenceFailed(_) => FailureKind::PersistenceFailed,
        }
    }

    /// Raw backend payload for contract violations, kept for diagnosis.
    pub fn raw_payload(&self) -> Option<&str> {
        match self {
            SubmissionError::MalformedResponse { raw, .. }
            | SubmissionError::IncompleteResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl From<TransportError> for SubmissionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { status, body } => SubmissionError::TransportFailed {
                status: Some(status),
                message: if body.is_empty() {
                    format!("backend answered with HTTP {}", status)
                } else {
                    body
                },
            },
            TransportError::Network(message) | TransportError::Request(message) => {
                SubmissionError::TransportFailed {
                    status: None,
                    message,
                }
            }
        }
    }
}
