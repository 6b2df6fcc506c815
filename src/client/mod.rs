//! # Client Components
//!
//! The client is split into two main components:
//!
//! ## Core Client ([`client`])
//! Handles the primary responsibility: uploading one image to the analysis
//! backend and returning the raw reply. Where the upload goes is decided by
//! the [`transport`] selector.
//!
//! ## Submission Orchestrator ([`orchestrator`])
//! Manages all coordination concerns:
//! - Trial eligibility
//! - Size reduction before upload
//! - Timeout on the upload
//! - Response validation
//! - Persisting the report, then spending the credit
//!
//! Validated diagnoses are turned into display form by [`presenter`], and
//! attempts can be recorded into [`metrics`].

pub mod client;
pub mod metrics;
pub mod orchestrator;
pub mod presenter;
pub mod transport;

// Re-export for convenience
pub use client::{AnalysisBackend, BackendReply, ClientCore};
pub use metrics::ClientMetrics;
pub use orchestrator::{
    SubmissionFailure, SubmissionOrchestrator, SubmissionOutcome, SubmissionState,
    SubmissionWarning, MULTIPART_ENVELOPE_ALLOWANCE,
};
pub use presenter::{present, DiagnosisView, TreatmentStep};
pub use transport::{OutgoingRequest, TransportMode, TransportSelector};
