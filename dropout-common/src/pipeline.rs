//! Single-submission prediction pipeline
//!
//! validate → engineer → align → infer → attribute
//!
//! The first four steps are fatal for the submission. Attribution failures
//! are reported inside the result; the prediction stays valid.

use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::attribution::{
    normalize, AttributionShape, BaselineConfidence, Explanation, DEFAULT_TOP_FEATURES,
};
use crate::features::{engineer, StudentRecord};
use crate::inference::{infer, ClassMapping, PredictionOutcome};
use crate::model::{Classifier, Explainer};
use crate::schema::{align, AlignedRecord};
use crate::Result;

/// Per-process pipeline settings
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub classes: ClassMapping,
    pub top_features: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            classes: ClassMapping::default(),
            top_features: DEFAULT_TOP_FEATURES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttributionOutcome {
    Explained { explanation: Explanation },
    Failed { error: String },
}

impl AttributionOutcome {
    pub fn explanation(&self) -> Option<&Explanation> {
        match self {
            AttributionOutcome::Explained { explanation } => Some(explanation),
            AttributionOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
    pub request_id: Uuid,
    pub warnings: Vec<String>,
    /// Aligned input row as fed to the model
    pub input: AlignedRecord,
    pub prediction: PredictionOutcome,
    pub attribution: AttributionOutcome,
}

/// Run the whole pipeline for one form submission
pub fn run_prediction(
    record: &StudentRecord,
    classifier: &dyn Classifier,
    explainer: &dyn Explainer,
    settings: &PipelineSettings,
) -> Result<PredictionReport> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id);
    let _guard = span.enter();

    let mut warnings = Vec::new();

    record.validate()?;
    let features = engineer(record)?;

    let alignment = align(&features, classifier.expected_features())?;
    warnings.extend(alignment.warning);
    let input = alignment.record;

    let prediction = infer(classifier, &input, &settings.classes)?;
    if !prediction.probabilities_complete() {
        warnings.push(format!(
            "Model returned {} probabilities; unavailable values are reported as -1",
            prediction.probabilities.len()
        ));
    }
    info!(
        "Predicted {} (code {}, p={:.3})",
        prediction.predicted_label,
        prediction.predicted_code,
        prediction.probability_of_predicted_label
    );

    let attribution = match attribute(explainer, &input, settings) {
        Ok(explanation) => {
            if explanation.baseline_confidence == BaselineConfidence::Degraded {
                warnings.push(format!(
                    "Explainer baseline has no entry for class {}; the first entry was used",
                    explanation.target_class
                ));
            }
            AttributionOutcome::Explained { explanation }
        }
        Err(error) => {
            warn!("Attribution failed: {}", error);
            AttributionOutcome::Failed { error }
        }
    };

    Ok(PredictionReport {
        request_id,
        warnings,
        input,
        prediction,
        attribution,
    })
}

fn attribute(
    explainer: &dyn Explainer,
    input: &AlignedRecord,
    settings: &PipelineSettings,
) -> std::result::Result<Explanation, String> {
    let raw = explainer.explain(&input.to_f64()).map_err(|e| e.to_string())?;
    let shape = AttributionShape::inspect(raw).map_err(|e| e.to_string())?;
    let result = normalize(
        shape,
        &explainer.expected_value(),
        settings.classes.target,
        input.len(),
    )
    .map_err(|e| e.to_string())?;
    Explanation::build(result, input, settings.top_features).map_err(|e| e.to_string())
}
