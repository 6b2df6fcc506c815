pub mod client;
pub mod common;
pub mod error;
pub mod processing;
pub mod server;
pub mod store;

pub use client::{SubmissionOrchestrator, TransportSelector};
pub use common::messages::DiagnosisPayload;
pub use error::SubmissionError;
pub use processing::ImageAsset;
