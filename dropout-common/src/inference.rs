//! Inference adapter
//!
//! Runs a [`Classifier`] on one aligned record and turns the class code and
//! probability vector into a labeled outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::model::{Classifier, ModelError};
use crate::schema::AlignedRecord;

/// Reported in place of a probability the model did not produce
pub const PROBABILITY_UNAVAILABLE: f64 = -1.0;

/// Class code to label mapping plus the code treated as the alert class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMapping {
    pub labels: BTreeMap<usize, String>,
    pub target: usize,
}

impl Default for ClassMapping {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(0, "Graduate/Enrolled".to_string());
        labels.insert(1, "Dropout".to_string());
        Self { labels, target: 1 }
    }
}

impl ClassMapping {
    /// Label for `code`, or `Class <n> (undefined)` when unmapped
    pub fn label(&self, code: usize) -> String {
        self.labels
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("Class {} (undefined)", code))
    }

    /// Check the mapping against a model with `n_classes` classes
    pub fn check(&self, n_classes: usize) -> Result<(), String> {
        if !self.labels.contains_key(&self.target) {
            return Err(format!("target class {} has no label", self.target));
        }
        if self.target >= n_classes {
            return Err(format!(
                "target class {} is not below the model's {} classes",
                self.target, n_classes
            ));
        }
        if let Some(code) = self.labels.keys().find(|c| **c >= n_classes) {
            warn!(
                "Class label for code {} will never be used by a {}-class model",
                code, n_classes
            );
        }
        Ok(())
    }
}

/// Probability at `index`, or [`PROBABILITY_UNAVAILABLE`] when out of range
pub fn probability_at(proba: &[f64], index: usize) -> f64 {
    match proba.get(index) {
        Some(p) => *p,
        None => {
            warn!(
                "Probability vector has {} entries, no index {}",
                proba.len(),
                index
            );
            PROBABILITY_UNAVAILABLE
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutcome {
    pub predicted_code: usize,
    pub predicted_label: String,
    pub probabilities: Vec<f64>,
    pub probability_of_predicted_label: f64,
    pub probability_of_target_class: f64,
    pub target_class: usize,
    pub target_label: String,
    /// Predicted code equals the target class code
    pub is_target: bool,
}

impl PredictionOutcome {
    /// Whether both reported probabilities were available
    pub fn probabilities_complete(&self) -> bool {
        self.probability_of_predicted_label != PROBABILITY_UNAVAILABLE
            && self.probability_of_target_class != PROBABILITY_UNAVAILABLE
    }
}

/// Predict one record
pub fn infer(
    model: &dyn Classifier,
    record: &AlignedRecord,
    classes: &ClassMapping,
) -> Result<PredictionOutcome, ModelError> {
    let row = record.to_f64();
    let predicted_code = model.predict(&row)?;
    let probabilities = model.predict_proba(&row)?;

    Ok(PredictionOutcome {
        predicted_code,
        predicted_label: classes.label(predicted_code),
        probability_of_predicted_label: probability_at(&probabilities, predicted_code),
        probability_of_target_class: probability_at(&probabilities, classes.target),
        probabilities,
        target_class: classes.target,
        target_label: classes.label(classes.target),
        is_target: predicted_code == classes.target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureValue, FeatureVector};
    use crate::schema::align;

    /// Returns a fixed code and probability vector
    struct Fixed {
        code: usize,
        proba: Vec<f64>,
    }

    impl Classifier for Fixed {
        fn predict(&self, _row: &[f64]) -> Result<usize, ModelError> {
            Ok(self.code)
        }
        fn predict_proba(&self, _row: &[f64]) -> Result<Vec<f64>, ModelError> {
            Ok(self.proba.clone())
        }
        fn expected_features(&self) -> Option<&[String]> {
            None
        }
        fn n_classes(&self) -> usize {
            self.proba.len()
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn predict(&self, _row: &[f64]) -> Result<usize, ModelError> {
            Err(ModelError::Inference("bad input".to_string()))
        }
        fn predict_proba(&self, _row: &[f64]) -> Result<Vec<f64>, ModelError> {
            Err(ModelError::Inference("bad input".to_string()))
        }
        fn expected_features(&self) -> Option<&[String]> {
            None
        }
        fn n_classes(&self) -> usize {
            2
        }
    }

    fn record() -> AlignedRecord {
        let fv = FeatureVector::from_pairs([("x", FeatureValue::Float(1.0))]).unwrap();
        align(&fv, None).unwrap().record
    }

    #[test]
    fn test_dropout_outcome() {
        let model = Fixed {
            code: 1,
            proba: vec![0.2, 0.8],
        };
        let outcome = infer(&model, &record(), &ClassMapping::default()).unwrap();
        assert_eq!(outcome.predicted_label, "Dropout");
        assert_eq!(outcome.probability_of_predicted_label, 0.8);
        assert_eq!(outcome.probability_of_target_class, 0.8);
        assert!(outcome.is_target);
        assert!(outcome.probabilities_complete());
    }

    #[test]
    fn test_non_target_outcome() {
        let model = Fixed {
            code: 0,
            proba: vec![0.7, 0.3],
        };
        let outcome = infer(&model, &record(), &ClassMapping::default()).unwrap();
        assert_eq!(outcome.predicted_label, "Graduate/Enrolled");
        assert_eq!(outcome.probability_of_predicted_label, 0.7);
        assert_eq!(outcome.probability_of_target_class, 0.3);
        assert!(!outcome.is_target);
    }

    #[test]
    fn test_short_probability_vector_uses_sentinel() {
        let model = Fixed {
            code: 1,
            proba: vec![1.0],
        };
        let outcome = infer(&model, &record(), &ClassMapping::default()).unwrap();
        assert_eq!(outcome.probability_of_predicted_label, PROBABILITY_UNAVAILABLE);
        assert_eq!(outcome.probability_of_target_class, PROBABILITY_UNAVAILABLE);
        assert!(!outcome.probabilities_complete());
    }

    #[test]
    fn test_unknown_code_label() {
        let model = Fixed {
            code: 4,
            proba: vec![0.1, 0.1, 0.1, 0.1, 0.6],
        };
        let outcome = infer(&model, &record(), &ClassMapping::default()).unwrap();
        assert_eq!(outcome.predicted_label, "Class 4 (undefined)");
        assert_eq!(outcome.probability_of_predicted_label, 0.6);
    }

    #[test]
    fn test_model_error_propagates() {
        let err = infer(&Broken, &record(), &ClassMapping::default()).unwrap_err();
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_mapping_check() {
        let mapping = ClassMapping::default();
        assert!(mapping.check(2).is_ok());

        let mapping = ClassMapping {
            target: 2,
            ..ClassMapping::default()
        };
        assert!(mapping.check(3).unwrap_err().contains("no label"));

        let mut labels = BTreeMap::new();
        labels.insert(2, "Dropout".to_string());
        let mapping = ClassMapping { labels, target: 2 };
        assert!(mapping.check(2).unwrap_err().contains("not below"));
    }
}
