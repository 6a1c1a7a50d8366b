//! Student record and feature engineering
//!
//! A [`StudentRecord`] holds one manually entered student (the prediction
//! form). [`engineer`] derives the auxiliary features (pass ratios, total
//! enrolled units, average grade) and flattens everything into a named
//! [`FeatureVector`] in form order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const PASS_RATIO_SEM1: &str = "pass_ratio_sem1";
pub const PASS_RATIO_SEM2: &str = "pass_ratio_sem2";
pub const TOTAL_ENROLLED: &str = "total_enrolled";
pub const AVERAGE_GRADE: &str = "average_grade";

/// Feature engineering errors
#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    /// Feature names must be non-empty
    #[error("Feature name must not be empty")]
    EmptyName,

    /// Feature names must be unique within a vector
    #[error("Duplicate feature name: {0}")]
    DuplicateName(String),

    /// A form value is outside the range the form accepts
    #[error("Field '{field}' = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// NaN or infinite values are never accepted
    #[error("Field '{0}' must be a finite number")]
    NotFinite(&'static str),
}

/// One scalar feature value
///
/// Integers (codes, counts, boolean flags) stay integers so the input echo
/// shows them as entered; the model always sees `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
}

impl FeatureValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FeatureValue::Int(v) => v as f64,
            FeatureValue::Float(v) => v,
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

/// Insertion-ordered map of feature name to value
///
/// Invariant: every name is non-empty and appears once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureVector {
    entries: Vec<(String, FeatureValue)>,
    #[serde(skip)]
    names: HashSet<String>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs, rejecting empty or repeated names
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, FeatureError>
    where
        I: IntoIterator<Item = (S, FeatureValue)>,
        S: Into<String>,
    {
        let mut fv = Self::new();
        for (name, value) in pairs {
            fv.insert(name, value)?;
        }
        Ok(fv)
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FeatureValue>,
    ) -> Result<(), FeatureError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FeatureError::EmptyName);
        }
        if !self.names.insert(name.clone()) {
            return Err(FeatureError::DuplicateName(name));
        }
        self.entries.push((name, value.into()));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureValue)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Features computed from the raw record
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedFeatures {
    pub pass_ratio_sem1: f64,
    pub pass_ratio_sem2: f64,
    pub total_enrolled: f64,
    pub average_grade: f64,
}

/// `approved / enrolled`, or 0.0 when nothing was enrolled
pub fn pass_ratio(approved: i64, enrolled: i64) -> f64 {
    if enrolled > 0 {
        approved as f64 / enrolled as f64
    } else {
        0.0
    }
}

/// Mean grade over semesters with enrolled units, or 0.0 if there are none
///
/// A semester without enrollment never contributes its grade.
pub fn average_grade(semesters: &[(i64, f64)]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &(enrolled, grade) in semesters {
        if enrolled > 0 {
            sum += grade;
            count += 1;
        }
    }
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

/// One student as entered on the prediction form
///
/// Serialized names match the dataset/model column names. Absent fields take
/// the form's default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudentRecord {
    #[serde(rename = "Marital_status")]
    pub marital_status: i64,
    #[serde(rename = "Application_mode")]
    pub application_mode: i64,
    #[serde(rename = "Application_order")]
    pub application_order: i64,
    #[serde(rename = "Course")]
    pub course: i64,
    #[serde(rename = "Daytime_evening_attendance")]
    pub daytime_evening_attendance: i64,
    #[serde(rename = "Previous_qualification")]
    pub previous_qualification: i64,
    #[serde(rename = "Previous_qualification_grade")]
    pub previous_qualification_grade: f64,
    #[serde(rename = "Nacionality")]
    pub nacionality: i64,
    #[serde(rename = "Mothers_qualification")]
    pub mothers_qualification: i64,
    #[serde(rename = "Fathers_qualification")]
    pub fathers_qualification: i64,
    #[serde(rename = "Mothers_occupation")]
    pub mothers_occupation: i64,
    #[serde(rename = "Fathers_occupation")]
    pub fathers_occupation: i64,
    #[serde(rename = "Admission_grade")]
    pub admission_grade: f64,
    #[serde(rename = "Displaced")]
    pub displaced: i64,
    #[serde(rename = "Educational_special_needs")]
    pub educational_special_needs: i64,
    #[serde(rename = "Debtor")]
    pub debtor: i64,
    #[serde(rename = "Tuition_fees_up_to_date")]
    pub tuition_fees_up_to_date: i64,
    #[serde(rename = "Gender")]
    pub gender: i64,
    #[serde(rename = "Scholarship_holder")]
    pub scholarship_holder: i64,
    #[serde(rename = "Age_at_enrollment")]
    pub age_at_enrollment: i64,
    #[serde(rename = "International")]
    pub international: i64,

    #[serde(rename = "Curricular_units_1st_sem_credited")]
    pub cu1_credited: i64,
    #[serde(rename = "Curricular_units_1st_sem_enrolled")]
    pub cu1_enrolled: i64,
    #[serde(rename = "Curricular_units_1st_sem_evaluations")]
    pub cu1_evaluations: i64,
    #[serde(rename = "Curricular_units_1st_sem_approved")]
    pub cu1_approved: i64,
    #[serde(rename = "Curricular_units_1st_sem_grade")]
    pub cu1_grade: f64,

    #[serde(rename = "Curricular_units_2nd_sem_credited")]
    pub cu2_credited: i64,
    #[serde(rename = "Curricular_units_2nd_sem_enrolled")]
    pub cu2_enrolled: i64,
    #[serde(rename = "Curricular_units_2nd_sem_evaluations")]
    pub cu2_evaluations: i64,
    #[serde(rename = "Curricular_units_2nd_sem_approved")]
    pub cu2_approved: i64,
    #[serde(rename = "Curricular_units_2nd_sem_grade")]
    pub cu2_grade: f64,

    #[serde(rename = "Unemployment_rate")]
    pub unemployment_rate: f64,
    #[serde(rename = "Inflation_rate")]
    pub inflation_rate: f64,
    #[serde(rename = "GDP")]
    pub gdp: f64,
}

impl Default for StudentRecord {
    fn default() -> Self {
        Self {
            marital_status: 1,
            application_mode: 17,
            application_order: 1,
            course: 9773,
            daytime_evening_attendance: 1,
            previous_qualification: 1,
            previous_qualification_grade: 120.0,
            nacionality: 1,
            mothers_qualification: 37,
            fathers_qualification: 37,
            mothers_occupation: 9,
            fathers_occupation: 9,
            admission_grade: 125.0,
            displaced: 1,
            educational_special_needs: 1,
            debtor: 1,
            tuition_fees_up_to_date: 1,
            gender: 1,
            scholarship_holder: 1,
            age_at_enrollment: 20,
            international: 1,
            cu1_credited: 0,
            cu1_enrolled: 6,
            cu1_evaluations: 8,
            cu1_approved: 6,
            cu1_grade: 13.5,
            cu2_credited: 0,
            cu2_enrolled: 6,
            cu2_evaluations: 6,
            cu2_approved: 5,
            cu2_grade: 12.0,
            unemployment_rate: 10.0,
            inflation_rate: 1.0,
            gdp: 0.0,
        }
    }
}

const NO_MAX: f64 = f64::INFINITY;

fn check(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), FeatureError> {
    if !value.is_finite() {
        return Err(FeatureError::NotFinite(field));
    }
    if value < min || value > max {
        return Err(FeatureError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl StudentRecord {
    /// Enforce the bounds the prediction form accepts
    pub fn validate(&self) -> Result<(), FeatureError> {
        let ints: &[(&'static str, i64, f64, f64)] = &[
            ("Marital_status", self.marital_status, 1.0, 6.0),
            ("Application_mode", self.application_mode, 1.0, NO_MAX),
            ("Application_order", self.application_order, 0.0, 9.0),
            ("Course", self.course, 33.0, NO_MAX),
            ("Daytime_evening_attendance", self.daytime_evening_attendance, 0.0, 1.0),
            ("Previous_qualification", self.previous_qualification, 1.0, NO_MAX),
            ("Nacionality", self.nacionality, 1.0, NO_MAX),
            ("Mothers_qualification", self.mothers_qualification, 1.0, NO_MAX),
            ("Fathers_qualification", self.fathers_qualification, 1.0, NO_MAX),
            ("Mothers_occupation", self.mothers_occupation, 0.0, NO_MAX),
            ("Fathers_occupation", self.fathers_occupation, 0.0, NO_MAX),
            ("Displaced", self.displaced, 0.0, 1.0),
            ("Educational_special_needs", self.educational_special_needs, 0.0, 1.0),
            ("Debtor", self.debtor, 0.0, 1.0),
            ("Tuition_fees_up_to_date", self.tuition_fees_up_to_date, 0.0, 1.0),
            ("Gender", self.gender, 0.0, 1.0),
            ("Scholarship_holder", self.scholarship_holder, 0.0, 1.0),
            ("Age_at_enrollment", self.age_at_enrollment, 16.0, 70.0),
            ("International", self.international, 0.0, 1.0),
            ("Curricular_units_1st_sem_credited", self.cu1_credited, 0.0, NO_MAX),
            ("Curricular_units_1st_sem_enrolled", self.cu1_enrolled, 0.0, 50.0),
            ("Curricular_units_1st_sem_evaluations", self.cu1_evaluations, 0.0, NO_MAX),
            ("Curricular_units_1st_sem_approved", self.cu1_approved, 0.0, 50.0),
            ("Curricular_units_2nd_sem_credited", self.cu2_credited, 0.0, NO_MAX),
            ("Curricular_units_2nd_sem_enrolled", self.cu2_enrolled, 0.0, 50.0),
            ("Curricular_units_2nd_sem_evaluations", self.cu2_evaluations, 0.0, NO_MAX),
            ("Curricular_units_2nd_sem_approved", self.cu2_approved, 0.0, 50.0),
        ];
        for &(field, value, min, max) in ints {
            check(field, value as f64, min, max)?;
        }

        check("Previous_qualification_grade", self.previous_qualification_grade, 0.0, 200.0)?;
        check("Admission_grade", self.admission_grade, 0.0, 200.0)?;
        check("Curricular_units_1st_sem_grade", self.cu1_grade, 0.0, 20.0)?;
        check("Curricular_units_2nd_sem_grade", self.cu2_grade, 0.0, 20.0)?;
        check("Unemployment_rate", self.unemployment_rate, f64::NEG_INFINITY, NO_MAX)?;
        check("Inflation_rate", self.inflation_rate, f64::NEG_INFINITY, NO_MAX)?;
        check("GDP", self.gdp, f64::NEG_INFINITY, NO_MAX)?;
        Ok(())
    }

    /// Compute the derived features
    pub fn derive(&self) -> DerivedFeatures {
        DerivedFeatures {
            pass_ratio_sem1: pass_ratio(self.cu1_approved, self.cu1_enrolled),
            pass_ratio_sem2: pass_ratio(self.cu2_approved, self.cu2_enrolled),
            total_enrolled: (self.cu1_enrolled + self.cu2_enrolled) as f64,
            average_grade: average_grade(&[
                (self.cu1_enrolled, self.cu1_grade),
                (self.cu2_enrolled, self.cu2_grade),
            ]),
        }
    }
}

/// Raw fields and derived features as one named vector
///
/// Order: demographic/application fields, semester 1, semester 2, derived
/// features, macroeconomic indicators.
pub fn engineer(record: &StudentRecord) -> Result<FeatureVector, FeatureError> {
    let d = record.derive();
    let r = record;

    let pairs: Vec<(&str, FeatureValue)> = vec![
        ("Marital_status", r.marital_status.into()),
        ("Application_mode", r.application_mode.into()),
        ("Application_order", r.application_order.into()),
        ("Course", r.course.into()),
        ("Daytime_evening_attendance", r.daytime_evening_attendance.into()),
        ("Previous_qualification", r.previous_qualification.into()),
        ("Previous_qualification_grade", r.previous_qualification_grade.into()),
        ("Nacionality", r.nacionality.into()),
        ("Mothers_qualification", r.mothers_qualification.into()),
        ("Fathers_qualification", r.fathers_qualification.into()),
        ("Mothers_occupation", r.mothers_occupation.into()),
        ("Fathers_occupation", r.fathers_occupation.into()),
        ("Admission_grade", r.admission_grade.into()),
        ("Displaced", r.displaced.into()),
        ("Educational_special_needs", r.educational_special_needs.into()),
        ("Debtor", r.debtor.into()),
        ("Tuition_fees_up_to_date", r.tuition_fees_up_to_date.into()),
        ("Gender", r.gender.into()),
        ("Scholarship_holder", r.scholarship_holder.into()),
        ("Age_at_enrollment", r.age_at_enrollment.into()),
        ("International", r.international.into()),
        ("Curricular_units_1st_sem_credited", r.cu1_credited.into()),
        ("Curricular_units_1st_sem_enrolled", r.cu1_enrolled.into()),
        ("Curricular_units_1st_sem_evaluations", r.cu1_evaluations.into()),
        ("Curricular_units_1st_sem_approved", r.cu1_approved.into()),
        ("Curricular_units_1st_sem_grade", r.cu1_grade.into()),
        ("Curricular_units_2nd_sem_credited", r.cu2_credited.into()),
        ("Curricular_units_2nd_sem_enrolled", r.cu2_enrolled.into()),
        ("Curricular_units_2nd_sem_evaluations", r.cu2_evaluations.into()),
        ("Curricular_units_2nd_sem_approved", r.cu2_approved.into()),
        ("Curricular_units_2nd_sem_grade", r.cu2_grade.into()),
        (PASS_RATIO_SEM1, d.pass_ratio_sem1.into()),
        (PASS_RATIO_SEM2, d.pass_ratio_sem2.into()),
        (TOTAL_ENROLLED, d.total_enrolled.into()),
        (AVERAGE_GRADE, d.average_grade.into()),
        ("Unemployment_rate", r.unemployment_rate.into()),
        ("Inflation_rate", r.inflation_rate.into()),
        ("GDP", r.gdp.into()),
    ];

    FeatureVector::from_pairs(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_ratio_zero_enrollment() {
        for approved in [0, 3, 50] {
            assert_eq!(pass_ratio(approved, 0), 0.0);
        }
    }

    #[test]
    fn test_pass_ratio_exact_half() {
        assert_eq!(pass_ratio(3, 6), 0.5);
    }

    #[test]
    fn test_average_grade_skips_unenrolled_semester() {
        assert_eq!(average_grade(&[(6, 13.5), (0, 19.0)]), 13.5);
    }

    #[test]
    fn test_average_grade_no_enrollment() {
        assert_eq!(average_grade(&[(0, 13.5), (0, 12.0)]), 0.0);
    }

    #[test]
    fn test_derive_scenario() {
        let record = StudentRecord {
            cu1_enrolled: 6,
            cu1_approved: 6,
            cu1_grade: 13.5,
            cu2_enrolled: 6,
            cu2_approved: 5,
            cu2_grade: 12.0,
            ..Default::default()
        };
        let d = record.derive();
        assert_eq!(d.pass_ratio_sem1, 1.0);
        assert!((d.pass_ratio_sem2 - 0.8333).abs() < 1e-4);
        assert_eq!(d.total_enrolled, 12.0);
        assert_eq!(d.average_grade, 12.75);
    }

    #[test]
    fn test_engineer_contains_all_features() {
        let fv = engineer(&StudentRecord::default()).unwrap();
        assert_eq!(fv.len(), 38);
        assert_eq!(fv.get("Course"), Some(FeatureValue::Int(9773)));
        assert_eq!(fv.get(TOTAL_ENROLLED), Some(FeatureValue::Float(12.0)));
        let names: Vec<&str> = fv.names().collect();
        assert_eq!(names[0], "Marital_status");
        assert_eq!(names[37], "GDP");
    }

    #[test]
    fn test_feature_vector_rejects_duplicates_and_empty_names() {
        let mut fv = FeatureVector::new();
        fv.insert("a", 1i64).unwrap();
        assert_eq!(
            fv.insert("a", 2.0),
            Err(FeatureError::DuplicateName("a".to_string()))
        );
        assert_eq!(fv.insert("", 2.0), Err(FeatureError::EmptyName));
        assert_eq!(fv.len(), 1);
    }

    #[test]
    fn test_validate_bounds() {
        assert!(StudentRecord::default().validate().is_ok());

        let record = StudentRecord {
            age_at_enrollment: 12,
            ..Default::default()
        };
        assert!(matches!(
            record.validate(),
            Err(FeatureError::OutOfRange {
                field: "Age_at_enrollment",
                ..
            })
        ));

        let record = StudentRecord {
            cu2_grade: f64::NAN,
            ..Default::default()
        };
        assert_eq!(
            record.validate(),
            Err(FeatureError::NotFinite("Curricular_units_2nd_sem_grade"))
        );
    }

    #[test]
    fn test_deserialize_fills_defaults_and_rejects_unknown() {
        let record: StudentRecord =
            serde_json::from_str(r#"{"Age_at_enrollment": 30, "GDP": 1.5}"#).unwrap();
        assert_eq!(record.age_at_enrollment, 30);
        assert_eq!(record.gdp, 1.5);
        assert_eq!(record.course, 9773);

        let err = serde_json::from_str::<StudentRecord>(r#"{"Agee": 30}"#);
        assert!(err.is_err());
    }
}
