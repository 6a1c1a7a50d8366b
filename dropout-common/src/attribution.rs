//! Attribution normalization
//!
//! Tree explainers report per-feature contributions in different layouts
//! depending on class count and explainer version:
//!
//! - a list with one `rows × features` matrix per class
//! - a single `rows × features` matrix (binary, positive class)
//! - a single `rows × features × classes` tensor
//!
//! [`AttributionShape::inspect`] resolves the raw arrays into one tagged
//! variant, and [`normalize`] reduces any variant to one flat contribution
//! vector plus a scalar baseline for a single target class and a single row.

use ndarray::{Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, warn};

use crate::features::FeatureValue;
use crate::schema::AlignedRecord;

/// Number of features listed in an explanation by default
pub const DEFAULT_TOP_FEATURES: usize = 15;

/// Attribution errors
///
/// These abort the attribution step only; a prediction already produced for
/// the same record stays valid.
#[derive(Debug, Error, PartialEq)]
pub enum AttributionError {
    /// Rank or container the normalizer does not know how to reduce
    #[error("Unsupported attribution output shape: {0}")]
    UnsupportedShape(String),

    /// Per-class list does not contain the target class
    #[error("Attribution list has {len} class entries; target class {target} is out of range")]
    ClassListTooShort { len: usize, target: usize },

    /// Tensor class axis does not contain the target class
    #[error("Attribution tensor of shape {shape:?} has no class index {target}")]
    ClassAxisOutOfRange { shape: Vec<usize>, target: usize },

    /// Single-instance explanations need exactly one row
    #[error("Attribution output of shape {shape:?} must hold exactly one row")]
    NotSingleRow { shape: Vec<usize> },

    /// Contribution count differs from the aligned record's column count
    #[error("Attribution has {contributions} contributions but the input has {columns} columns")]
    LengthMismatch { contributions: usize, columns: usize },
}

/// Explainer output before shape inspection
#[derive(Debug, Clone, PartialEq)]
pub enum RawAttribution {
    /// Sequence of arrays, nominally one per class
    List(Vec<ArrayD<f64>>),
    /// One array of any rank
    Array(ArrayD<f64>),
}

/// The explainer's expected (baseline) model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedValue {
    Scalar(f64),
    PerClass(Vec<f64>),
}

/// Shape family reported alongside an attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeFamily {
    PerClassList,
    Matrix,
    Tensor,
}

/// Explainer output resolved into one known layout
#[derive(Debug, Clone, PartialEq)]
pub enum AttributionShape {
    /// One `rows × features` matrix per class
    PerClassList(Vec<Array2<f64>>),
    /// `rows × features`, already for the target (positive) class
    Matrix(Array2<f64>),
    /// `rows × features × classes`
    Tensor(Array3<f64>),
}

fn describe_dyn(array: &ArrayD<f64>) -> String {
    format!("rank-{} array of shape {:?}", array.ndim(), array.shape())
}

impl AttributionShape {
    /// Resolve a raw explainer output into a shape family
    pub fn inspect(raw: RawAttribution) -> Result<Self, AttributionError> {
        match raw {
            RawAttribution::List(items) => {
                if items.is_empty() {
                    return Err(AttributionError::UnsupportedShape(
                        "empty list of arrays".to_string(),
                    ));
                }
                let mut matrices = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let desc = describe_dyn(&item);
                    let matrix = item.into_dimensionality::<Ix2>().map_err(|_| {
                        AttributionError::UnsupportedShape(format!(
                            "list element {} is a {}, expected rank 2",
                            i, desc
                        ))
                    })?;
                    matrices.push(matrix);
                }
                Ok(AttributionShape::PerClassList(matrices))
            }
            RawAttribution::Array(array) => match array.ndim() {
                2 => array
                    .into_dimensionality::<Ix2>()
                    .map(AttributionShape::Matrix)
                    .map_err(|e| AttributionError::UnsupportedShape(e.to_string())),
                3 => array
                    .into_dimensionality::<Ix3>()
                    .map(AttributionShape::Tensor)
                    .map_err(|e| AttributionError::UnsupportedShape(e.to_string())),
                _ => Err(AttributionError::UnsupportedShape(describe_dyn(&array))),
            },
        }
    }

    pub fn family(&self) -> ShapeFamily {
        match self {
            AttributionShape::PerClassList(_) => ShapeFamily::PerClassList,
            AttributionShape::Matrix(_) => ShapeFamily::Matrix,
            AttributionShape::Tensor(_) => ShapeFamily::Tensor,
        }
    }
}

/// Whether the baseline was picked for the target class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineConfidence {
    Exact,
    /// Expected-value sequence did not cover the target; first entry used
    Degraded,
}

/// Per-feature contributions for one row and one target class
///
/// Invariant: `contributions.len()` equals the aligned record's column count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionResult {
    pub contributions: Vec<f64>,
    pub baseline: f64,
    pub target_class: usize,
    pub baseline_confidence: BaselineConfidence,
    pub shape_family: ShapeFamily,
}

impl AttributionResult {
    /// `baseline + Σ contributions`: the raw model output for the target class
    pub fn raw_output(&self) -> f64 {
        self.baseline + self.contributions.iter().sum::<f64>()
    }
}

/// Reduce an expected value to the scalar for `target`
pub fn resolve_baseline(expected: &ExpectedValue, target: usize) -> (f64, BaselineConfidence) {
    match expected {
        ExpectedValue::Scalar(v) => (*v, BaselineConfidence::Exact),
        ExpectedValue::PerClass(values) => match values.get(target) {
            Some(v) => (*v, BaselineConfidence::Exact),
            None => {
                let fallback = values.first().copied().unwrap_or(0.0);
                warn!(
                    "Expected value has {} entries, none for class {}; using {} as baseline",
                    values.len(),
                    target,
                    fallback
                );
                (fallback, BaselineConfidence::Degraded)
            }
        },
    }
}

fn single_row(matrix: &Array2<f64>) -> Result<Vec<f64>, AttributionError> {
    if matrix.nrows() != 1 {
        return Err(AttributionError::NotSingleRow {
            shape: matrix.shape().to_vec(),
        });
    }
    Ok(matrix.row(0).to_vec())
}

/// Reduce an attribution to one flat vector for `target` and check its length
pub fn normalize(
    shape: AttributionShape,
    expected: &ExpectedValue,
    target: usize,
    n_columns: usize,
) -> Result<AttributionResult, AttributionError> {
    let family = shape.family();

    let contributions = match &shape {
        AttributionShape::PerClassList(per_class) => {
            let matrix = per_class
                .get(target)
                .ok_or(AttributionError::ClassListTooShort {
                    len: per_class.len(),
                    target,
                })?;
            single_row(matrix)?
        }
        AttributionShape::Matrix(matrix) => single_row(matrix)?,
        AttributionShape::Tensor(tensor) => {
            let dims = tensor.shape().to_vec();
            if dims[0] != 1 {
                return Err(AttributionError::NotSingleRow { shape: dims });
            }
            if target >= dims[2] {
                return Err(AttributionError::ClassAxisOutOfRange {
                    shape: dims,
                    target,
                });
            }
            tensor
                .index_axis(Axis(0), 0)
                .index_axis(Axis(1), target)
                .to_vec()
        }
    };

    if contributions.len() != n_columns {
        return Err(AttributionError::LengthMismatch {
            contributions: contributions.len(),
            columns: n_columns,
        });
    }

    let (baseline, baseline_confidence) = resolve_baseline(expected, target);
    debug!(
        "Normalized {:?} attribution for class {} ({} features)",
        family,
        target,
        contributions.len()
    );

    Ok(AttributionResult {
        contributions,
        baseline,
        target_class: target,
        baseline_confidence,
        shape_family: family,
    })
}

/// One feature's share of an explanation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: FeatureValue,
    pub contribution: f64,
}

/// Single-instance explanation shared by the waterfall and force views
///
/// Both views read the same contributions, baseline, input row and feature
/// names, so they always agree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub target_class: usize,
    pub baseline: f64,
    pub baseline_confidence: BaselineConfidence,
    pub shape_family: ShapeFamily,
    pub feature_names: Vec<String>,
    pub values: Vec<FeatureValue>,
    pub contributions: Vec<f64>,
    /// Raw model output (log-odds for binary models) for the target class
    pub raw_output: f64,
    /// Logistic transform of `raw_output`
    pub raw_output_logistic: f64,
    /// Largest absolute contributions first
    pub top_features: Vec<FeatureContribution>,
}

impl Explanation {
    pub fn build(
        result: AttributionResult,
        record: &AlignedRecord,
        top_n: usize,
    ) -> Result<Self, AttributionError> {
        if result.contributions.len() != record.len() {
            return Err(AttributionError::LengthMismatch {
                contributions: result.contributions.len(),
                columns: record.len(),
            });
        }

        let mut top_features: Vec<FeatureContribution> = record
            .columns()
            .iter()
            .zip(record.values())
            .zip(&result.contributions)
            .map(|((feature, value), contribution)| FeatureContribution {
                feature: feature.clone(),
                value: *value,
                contribution: *contribution,
            })
            .collect();
        top_features.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(Ordering::Equal)
        });
        top_features.truncate(top_n);

        let raw_output = result.raw_output();
        Ok(Self {
            target_class: result.target_class,
            baseline: result.baseline,
            baseline_confidence: result.baseline_confidence,
            shape_family: result.shape_family,
            feature_names: record.columns().to_vec(),
            values: record.values().to_vec(),
            contributions: result.contributions,
            raw_output,
            raw_output_logistic: 1.0 / (1.0 + (-raw_output).exp()),
            top_features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array, IxDyn};

    fn dyn2(rows: Vec<Vec<f64>>) -> ArrayD<f64> {
        let n = rows.len();
        let f = rows.first().map_or(0, Vec::len);
        Array::from_shape_vec(IxDyn(&[n, f]), rows.concat()).unwrap()
    }

    #[test]
    fn test_per_class_list_selects_target() {
        let raw = RawAttribution::List(vec![
            dyn2(vec![vec![-0.1, -0.2, -0.3]]),
            dyn2(vec![vec![0.1, 0.2, 0.3]]),
        ]);
        let shape = AttributionShape::inspect(raw).unwrap();
        assert_eq!(shape.family(), ShapeFamily::PerClassList);

        let result =
            normalize(shape, &ExpectedValue::PerClass(vec![0.5, -0.5]), 1, 3).unwrap();
        assert_eq!(result.contributions, vec![0.1, 0.2, 0.3]);
        assert_eq!(result.baseline, -0.5);
        assert_eq!(result.baseline_confidence, BaselineConfidence::Exact);
        assert_eq!(result.target_class, 1);
    }

    #[test]
    fn test_per_class_list_too_short() {
        let raw = RawAttribution::List(vec![dyn2(vec![vec![0.1, 0.2]])]);
        let shape = AttributionShape::inspect(raw).unwrap();
        assert_eq!(
            normalize(shape, &ExpectedValue::Scalar(0.0), 1, 2),
            Err(AttributionError::ClassListTooShort { len: 1, target: 1 })
        );
    }

    #[test]
    fn test_matrix_takes_only_row_and_scalar_baseline() {
        let shape = AttributionShape::Matrix(arr2(&[[0.4, -0.1]]));
        let result = normalize(shape, &ExpectedValue::Scalar(-1.2), 1, 2).unwrap();
        assert_eq!(result.contributions, vec![0.4, -0.1]);
        assert_eq!(result.baseline, -1.2);
        assert_eq!(result.shape_family, ShapeFamily::Matrix);
    }

    #[test]
    fn test_matrix_with_several_rows_is_rejected() {
        let shape = AttributionShape::Matrix(arr2(&[[0.4, -0.1], [0.0, 0.0]]));
        assert_eq!(
            normalize(shape, &ExpectedValue::Scalar(0.0), 1, 2),
            Err(AttributionError::NotSingleRow { shape: vec![2, 2] })
        );
    }

    #[test]
    fn test_tensor_slices_target_class() {
        // 1 row × 3 features × 2 classes
        let data = vec![0.9, 0.1, 0.8, 0.2, 0.7, 0.3];
        let raw = RawAttribution::Array(Array::from_shape_vec(IxDyn(&[1, 3, 2]), data).unwrap());
        let shape = AttributionShape::inspect(raw).unwrap();
        assert_eq!(shape.family(), ShapeFamily::Tensor);

        let result =
            normalize(shape, &ExpectedValue::PerClass(vec![0.3, 0.7]), 1, 3).unwrap();
        assert_eq!(result.contributions, vec![0.1, 0.2, 0.3]);
        assert_eq!(result.baseline, 0.7);
    }

    #[test]
    fn test_tensor_class_out_of_range() {
        let raw = RawAttribution::Array(Array::zeros(IxDyn(&[1, 3, 2])));
        let shape = AttributionShape::inspect(raw).unwrap();
        assert_eq!(
            normalize(shape, &ExpectedValue::Scalar(0.0), 2, 3),
            Err(AttributionError::ClassAxisOutOfRange {
                shape: vec![1, 3, 2],
                target: 2
            })
        );
    }

    #[test]
    fn test_unsupported_rank_names_shape() {
        let raw = RawAttribution::Array(Array::zeros(IxDyn(&[4])));
        let err = AttributionShape::inspect(raw).unwrap_err();
        assert!(err.to_string().contains("[4]"), "{}", err);

        let raw = RawAttribution::List(vec![Array::zeros(IxDyn(&[1, 2, 2]))]);
        let err = AttributionShape::inspect(raw).unwrap_err();
        assert!(err.to_string().contains("list element 0"), "{}", err);

        assert!(AttributionShape::inspect(RawAttribution::List(vec![])).is_err());
    }

    #[test]
    fn test_length_mismatch_is_reported() {
        let shape = AttributionShape::Matrix(arr2(&[[0.4, -0.1, 0.2]]));
        assert_eq!(
            normalize(shape, &ExpectedValue::Scalar(0.0), 1, 2),
            Err(AttributionError::LengthMismatch {
                contributions: 3,
                columns: 2
            })
        );
    }

    #[test]
    fn test_baseline_fallback_is_degraded() {
        let (v, c) = resolve_baseline(&ExpectedValue::PerClass(vec![0.25]), 1);
        assert_eq!(v, 0.25);
        assert_eq!(c, BaselineConfidence::Degraded);

        let (v, c) = resolve_baseline(&ExpectedValue::PerClass(vec![]), 1);
        assert_eq!(v, 0.0);
        assert_eq!(c, BaselineConfidence::Degraded);
    }

    #[test]
    fn test_expected_value_deserializes_both_forms() {
        let s: ExpectedValue = serde_json::from_str("0.5").unwrap();
        assert_eq!(s, ExpectedValue::Scalar(0.5));
        let v: ExpectedValue = serde_json::from_str("[0.1, 0.2]").unwrap();
        assert_eq!(v, ExpectedValue::PerClass(vec![0.1, 0.2]));
    }
}
