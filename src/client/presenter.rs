//! Display mapping for validated diagnoses.

use std::fmt;

use crate::common::messages::DiagnosisPayload;

pub const DISEASE_LABEL: &str = "Disease Detected";
pub const HEALTHY_LABEL: &str = "Healthy";

/// One numbered treatment or prevention step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentStep {
    /// 1-based position in the original list
    pub index: usize,
    pub title: String,
    pub detail: Option<String>,
}

impl TreatmentStep {
    /// Splits `raw` at the first `:` into a title and a detail.
    ///
    /// Text without a colon, or with nothing after it, becomes a bare title.
    pub fn parse(index: usize, raw: &str) -> Self {
        match raw.split_once(':') {
            Some((title, detail)) if !detail.trim().is_empty() => Self {
                index,
                title: title.trim().to_string(),
                detail: Some(detail.trim().to_string()),
            },
            Some((title, _)) => Self {
                index,
                title: title.trim().to_string(),
                detail: None,
            },
            None => Self {
                index,
                title: raw.trim().to_string(),
                detail: None,
            },
        }
    }
}

/// Display-ready form of a [`DiagnosisPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisView {
    pub plant_name: String,
    pub status_label: &'static str,
    pub disease_detected: bool,
    pub disease: String,
    pub summary: String,
    pub steps: Vec<TreatmentStep>,
    pub required_nutrients: Option<String>,
    pub recommended_treatment: Option<String>,
    pub growth_stage: Option<String>,
}

/// Maps a validated payload into a [`DiagnosisView`].
pub fn present(payload: &DiagnosisPayload) -> DiagnosisView {
    let steps = payload
        .prevention_steps
        .iter()
        .filter(|step| !step.trim().is_empty())
        .enumerate()
        .map(|(i, step)| TreatmentStep::parse(i + 1, step))
        .collect();

    DiagnosisView {
        plant_name: payload.plant_name.clone(),
        status_label: if payload.disease_detected {
            DISEASE_LABEL
        } else {
            HEALTHY_LABEL
        },
        disease_detected: payload.disease_detected,
        disease: payload.disease.clone(),
        summary: payload.description.clone(),
        steps,
        required_nutrients: non_blank(&payload.required_nutrients),
        recommended_treatment: non_blank(&payload.recommended_treatment),
        growth_stage: non_blank(&payload.growth_stage),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl fmt::Display for DiagnosisView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.disease_detected { "🦠" } else { "🌿" };

        writeln!(f, "{} {} [{}]", marker, self.plant_name, self.status_label)?;
        writeln!(f, "   Disease: {}", self.disease)?;

        if let Some(stage) = &self.growth_stage {
            writeln!(f, "   Growth stage: {}", stage)?;
        }

        if !self.summary.is_empty() {
            writeln!(f)?;
            writeln!(f, "   {}", self.summary)?;
        }

        if !self.steps.is_empty() {
            writeln!(f)?;
            writeln!(f, "   Treatment & prevention:")?;
            for step in &self.steps {
                match &step.detail {
                    Some(detail) => writeln!(f, "   {}. {}: {}", step.index, step.title, detail)?,
                    None => writeln!(f, "   {}. {}", step.index, step.title)?,
                }
            }
        }

        if let Some(nutrients) = &self.required_nutrients {
            writeln!(f)?;
            writeln!(f, "   Nutrients: {}", nutrients)?;
        }

        if let Some(treatment) = &self.recommended_treatment {
            writeln!(f, "   Recommended products: {}", treatment)?;
        }

        Ok(())
    }
}
