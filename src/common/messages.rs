//! # Wire Contract
//!
//! Message shapes exchanged with the analysis backend and the same-origin
//! proxy, plus validation of backend replies into a [`DiagnosisPayload`].
//!
//! ## Success envelope
//!
//! ```text
//! { "output": { "plant_name": "...", "disease": "...", "disease_detected": true,
//!               "description": "...", "prevention": ["..."],
//!               "required_nutrients": "...",                      (optional)
//!               "recommended_pesticides_or_fertilizers": "...",   (optional)
//!               "stage": "..." } }                                (optional)
//! ```
//!
//! A single-element array around the envelope is unwrapped first. Anything
//! else is a backend contract violation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SubmissionError;

/// Multipart field name carrying the image on every upload path.
pub const IMAGE_FIELD: &str = "image";

/// Header that makes tunnelling intermediaries skip their interstitial page.
pub const BYPASS_HEADER: &str = "ngrok-skip-browser-warning";

// ============================================================================
// DIAGNOSIS PAYLOAD
// ============================================================================

/// A fully validated diagnosis. Never partially populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisPayload {
    pub plant_name: String,
    pub disease: String,
    pub disease_detected: bool,
    pub description: String,
    /// Ordered prevention / cure steps
    pub prevention_steps: Vec<String>,
    pub required_nutrients: Option<String>,
    pub recommended_treatment: Option<String>,
    pub growth_stage: Option<String>,
}

/// Validate a raw backend body.
///
/// # Errors
/// - [`SubmissionError::EmptyResponse`] for a blank body
/// - [`SubmissionError::MalformedResponse`] when the body is not JSON
/// - [`SubmissionError::IncompleteResponse`] when the envelope or any required
///   field is missing or has the wrong type
pub fn parse_diagnosis(body: &str) -> Result<DiagnosisPayload, SubmissionError> {
    if body.trim().is_empty() {
        return Err(SubmissionError::EmptyResponse);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| SubmissionError::MalformedResponse {
            reason: e.to_string(),
            raw: body.to_string(),
        })?;

    let incomplete = |missing: Vec<String>| SubmissionError::IncompleteResponse {
        missing,
        raw: body.to_string(),
    };

    let envelope = match &value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    };

    let output = envelope
        .get("output")
        .and_then(Value::as_object)
        .ok_or_else(|| incomplete(vec!["output".to_string()]))?;

    let mut missing = Vec::new();

    let plant_name = required_text(output, "plant_name", &mut missing);
    let disease = required_text(output, "disease", &mut missing);

    let disease_detected = output.get("disease_detected").and_then(Value::as_bool);
    if disease_detected.is_none() {
        missing.push("disease_detected".to_string());
    }

    let description = output
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    if description.is_none() {
        missing.push("description".to_string());
    }

    let prevention_steps = output.get("prevention").and_then(string_list);
    if prevention_steps.is_none() {
        missing.push("prevention".to_string());
    }

    match (
        plant_name,
        disease,
        disease_detected,
        description,
        prevention_steps,
    ) {
        (
            Some(plant_name),
            Some(disease),
            Some(disease_detected),
            Some(description),
            Some(prevention_steps),
        ) => Ok(DiagnosisPayload {
            plant_name,
            disease,
            disease_detected,
            description,
            prevention_steps,
            required_nutrients: optional_text(output, "required_nutrients"),
            recommended_treatment: optional_text(output, "recommended_pesticides_or_fertilizers"),
            growth_stage: optional_text(output, "stage"),
        }),
        _ => Err(incomplete(missing)),
    }
}

fn required_text(output: &Map<String, Value>, key: &str, missing: &mut Vec<String>) -> Option<String> {
    let text = output
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if text.is_none() {
        missing.push(key.to_string());
    }
    text
}

fn optional_text(output: &Map<String, Value>, key: &str) -> Option<String> {
    output
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

// ============================================================================
// PROXY ERROR ENVELOPE
// ============================================================================

/// Normalised failure body returned by the same-origin proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyErrorBody {
    /// Always `false`
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub status: u16,
}

impl ProxyErrorBody {
    /// Recognise a proxy failure among arbitrary response bodies.
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|parsed| !parsed.success)
    }
}
