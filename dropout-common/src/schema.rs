//! Schema alignment
//!
//! Projects a [`FeatureVector`] onto the ordered feature list a model was
//! trained with. A missing expected feature is a hard error: the model is
//! never fed a guessed default.

use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::warn;

use crate::features::{FeatureValue, FeatureVector};

/// Warning attached to records aligned without a model schema
pub const NO_SCHEMA_WARNING: &str =
    "Model exposes no expected feature list; using all form features as-is. \
     Correctness depends on the form matching the training columns.";

/// Schema alignment errors
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    /// Expected features absent from the supplied record (sorted)
    #[error("Features expected by the model are missing from the input: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),
}

/// A single row whose columns match the model's schema
///
/// Invariant: `columns` and `values` have equal length; when built against a
/// schema, `columns` equals that schema exactly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRecord {
    columns: Vec<String>,
    values: Vec<FeatureValue>,
}

impl AlignedRecord {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    /// Row as the `f64` array the model consumes
    pub fn to_f64(&self) -> Vec<f64> {
        self.values.iter().map(FeatureValue::as_f64).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Aligned record plus any warning the caller must surface
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub record: AlignedRecord,
    pub warning: Option<String>,
}

/// Align `features` to `expected`
///
/// With a schema: fails naming every missing feature, otherwise keeps exactly
/// the schema's columns in the schema's order (extra features are dropped).
/// Without a schema: passes the vector through and returns a warning.
pub fn align(
    features: &FeatureVector,
    expected: Option<&[String]>,
) -> Result<Alignment, SchemaError> {
    let Some(schema) = expected else {
        warn!("{}", NO_SCHEMA_WARNING);
        let (columns, values): (Vec<String>, Vec<FeatureValue>) = features
            .iter()
            .map(|(name, value)| (name.to_string(), value))
            .unzip();
        return Ok(Alignment {
            record: AlignedRecord { columns, values },
            warning: Some(NO_SCHEMA_WARNING.to_string()),
        });
    };

    let missing: BTreeSet<&str> = schema
        .iter()
        .map(String::as_str)
        .filter(|name| !features.contains(name))
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::MissingFeatures(
            missing.into_iter().map(str::to_string).collect(),
        ));
    }

    let mut values = Vec::with_capacity(schema.len());
    for name in schema {
        match features.get(name) {
            Some(v) => values.push(v),
            None => return Err(SchemaError::MissingFeatures(vec![name.clone()])),
        }
    }

    Ok(Alignment {
        record: AlignedRecord {
            columns: schema.to_vec(),
            values,
        },
        warning: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(names: &[&str]) -> FeatureVector {
        FeatureVector::from_pairs(
            names
                .iter()
                .enumerate()
                .map(|(i, n)| (*n, FeatureValue::Int(i as i64))),
        )
        .unwrap()
    }

    fn schema(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_projects_in_schema_order() {
        let features = fv(&["D", "C", "A", "B"]);
        let expected = schema(&["A", "B", "C"]);
        let aligned = align(&features, Some(expected.as_slice())).unwrap();

        assert_eq!(aligned.record.columns(), expected.as_slice());
        assert_eq!(
            aligned.record.values(),
            &[FeatureValue::Int(2), FeatureValue::Int(3), FeatureValue::Int(1)]
        );
        assert!(aligned.warning.is_none());
    }

    #[test]
    fn test_missing_feature_is_named() {
        let features = fv(&["A", "B", "D"]);
        let expected = schema(&["A", "B", "C"]);
        assert_eq!(
            align(&features, Some(expected.as_slice())),
            Err(SchemaError::MissingFeatures(vec!["C".to_string()]))
        );
    }

    #[test]
    fn test_all_missing_features_reported_sorted() {
        let features = fv(&["A"]);
        let expected = schema(&["Z", "A", "M"]);
        let err = align(&features, Some(expected.as_slice())).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingFeatures(vec!["M".to_string(), "Z".to_string()])
        );
        assert!(err.to_string().contains("M, Z"));
    }

    #[test]
    fn test_no_schema_passes_through_with_warning() {
        let features = fv(&["B", "A"]);
        let aligned = align(&features, None).unwrap();
        assert_eq!(aligned.record.columns(), &["B".to_string(), "A".to_string()]);
        assert_eq!(aligned.warning.as_deref(), Some(NO_SCHEMA_WARNING));
    }
}
