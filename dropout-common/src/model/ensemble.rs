//! Gradient-boosted tree ensemble
//!
//! Binary models carry one output (the log-odds of class 1); models with
//! more classes carry one output per class and use softmax. Each tree adds
//! its leaf value to the margin of the output it is bound to.
//!
//! Attribution walks the same decision path as prediction. Every split
//! charges `child.value - node.value` to its feature, so for each output
//! `expected_value + Σ contributions` equals the raw margin.

use ndarray::{Array, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use super::{Classifier, Explainer, ModelError};
use crate::attribution::{ExpectedValue, RawAttribution};

/// Layout the explainer reports contributions in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainerOutput {
    /// One `1 × features` matrix per class
    #[default]
    PerClassList,
    /// One `1 × features` matrix for class 1 (binary models only)
    Matrix,
    /// One `1 × features × classes` tensor
    Tensor,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Branch taken when the feature value is NaN
        #[serde(default = "default_true")]
        default_left: bool,
        /// Mean output of the training samples reaching this node
        value: f64,
    },
    Leaf {
        value: f64,
    },
}

impl Node {
    pub fn value(&self) -> f64 {
        match self {
            Node::Split { value, .. } | Node::Leaf { value } => *value,
        }
    }
}

/// One regression tree stored as a flat node array, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Output (margin) index this tree contributes to
    pub output: usize,
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Follow the decision path for `row`, reporting each split's
    /// `(feature, child.value - node.value)`, and return the leaf value
    ///
    /// Relies on `validate`: children always sit after their parent.
    fn walk(&self, row: &[f64], mut visit: impl FnMut(usize, f64)) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                    value,
                } => {
                    let x = row[*feature];
                    let go_left = if x.is_nan() {
                        *default_left
                    } else {
                        x < *threshold
                    };
                    let next = if go_left { *left } else { *right };
                    visit(*feature, self.nodes[next].value() - value);
                    index = next;
                }
            }
        }
    }

    fn root_value(&self) -> f64 {
        self.nodes.first().map_or(0.0, Node::value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub n_features: usize,
    pub n_classes: usize,
    /// Initial margin, one per output
    pub base_score: Vec<f64>,
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub explainer_output: ExplainerOutput,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

impl TreeEnsemble {
    pub fn from_json_str(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }

    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    pub fn is_binary(&self) -> bool {
        self.n_classes == 2
    }

    pub fn n_outputs(&self) -> usize {
        if self.is_binary() {
            1
        } else {
            self.n_classes
        }
    }

    /// Check structural consistency; run before any prediction
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| Err(ModelError::Invalid(msg));

        if self.n_classes < 2 {
            return invalid(format!("n_classes must be at least 2, got {}", self.n_classes));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.n_features {
                return invalid(format!(
                    "{} feature names for {} features",
                    names.len(),
                    self.n_features
                ));
            }
        }
        if self.base_score.len() != self.n_outputs() {
            return invalid(format!(
                "base_score has {} entries, expected {}",
                self.base_score.len(),
                self.n_outputs()
            ));
        }
        if self.explainer_output == ExplainerOutput::Matrix && !self.is_binary() {
            return invalid("matrix explainer output requires a binary model".to_string());
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.output >= self.n_outputs() {
                return invalid(format!(
                    "tree {} bound to output {} of {}",
                    t,
                    tree.output,
                    self.n_outputs()
                ));
            }
            if tree.nodes.is_empty() {
                return invalid(format!("tree {} has no nodes", t));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                if let Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= self.n_features {
                        return invalid(format!(
                            "tree {} node {} splits on feature {} of {}",
                            t, i, feature, self.n_features
                        ));
                    }
                    if threshold.is_nan() {
                        return invalid(format!("tree {} node {} has a NaN threshold", t, i));
                    }
                    for child in [*left, *right] {
                        if child <= i || child >= tree.nodes.len() {
                            return invalid(format!(
                                "tree {} node {} has child index {} outside {}..{}",
                                t,
                                i,
                                child,
                                i + 1,
                                tree.nodes.len()
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_row(&self, row: &[f64]) -> Result<(), ModelError> {
        if row.len() != self.n_features {
            return Err(ModelError::Inference(format!(
                "model expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(())
    }

    /// Raw margin per output
    pub fn margins(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        self.check_row(row)?;
        let mut margins = self.base_score.clone();
        for tree in &self.trees {
            margins[tree.output] += tree.walk(row, |_, _| {});
        }
        Ok(margins)
    }

    /// Expected margin per output: base score plus every tree's root value
    fn expected_margins(&self) -> Vec<f64> {
        let mut expected = self.base_score.clone();
        for tree in &self.trees {
            expected[tree.output] += tree.root_value();
        }
        expected
    }

    /// Path contributions as `[output][feature]`
    fn output_contributions(&self, row: &[f64]) -> Result<Vec<Vec<f64>>, ModelError> {
        self.check_row(row)?;
        let mut phi = vec![vec![0.0; self.n_features]; self.n_outputs()];
        for tree in &self.trees {
            let out = &mut phi[tree.output];
            tree.walk(row, |feature, delta| out[feature] += delta);
        }
        Ok(phi)
    }

    /// Per-class view of per-output values; binary class 0 is the negation
    fn per_class<T: Clone>(&self, per_output: Vec<T>, negate: impl Fn(&T) -> T) -> Vec<T> {
        if self.is_binary() {
            let positive = per_output.into_iter().next();
            match positive {
                Some(p) => vec![negate(&p), p],
                None => Vec::new(),
            }
        } else {
            per_output
        }
    }

    fn class_contributions(&self, row: &[f64]) -> Result<Vec<Vec<f64>>, ModelError> {
        let phi = self.output_contributions(row)?;
        Ok(self.per_class(phi, |v| v.iter().map(|x| -x).collect()))
    }
}

fn row_matrix(values: Vec<f64>) -> Result<ArrayD<f64>, ModelError> {
    let n = values.len();
    Array::from_shape_vec(IxDyn(&[1, n]), values).map_err(|e| ModelError::Inference(e.to_string()))
}

impl Classifier for TreeEnsemble {
    fn predict(&self, row: &[f64]) -> Result<usize, ModelError> {
        let proba = self.predict_proba(row)?;
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        Ok(best)
    }

    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        let margins = self.margins(row)?;
        if self.is_binary() {
            let p = sigmoid(margins[0]);
            Ok(vec![1.0 - p, p])
        } else {
            Ok(softmax(&margins))
        }
    }

    fn expected_features(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

impl Explainer for TreeEnsemble {
    fn expected_value(&self) -> ExpectedValue {
        let expected = self.expected_margins();
        match self.explainer_output {
            ExplainerOutput::Matrix => ExpectedValue::Scalar(expected[0]),
            ExplainerOutput::PerClassList | ExplainerOutput::Tensor => {
                ExpectedValue::PerClass(self.per_class(expected, |v| -v))
            }
        }
    }

    fn explain(&self, row: &[f64]) -> Result<RawAttribution, ModelError> {
        match self.explainer_output {
            ExplainerOutput::Matrix => {
                let mut phi = self.output_contributions(row)?;
                Ok(RawAttribution::Array(row_matrix(phi.swap_remove(0))?))
            }
            ExplainerOutput::PerClassList => {
                let per_class = self
                    .class_contributions(row)?
                    .into_iter()
                    .map(row_matrix)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RawAttribution::List(per_class))
            }
            ExplainerOutput::Tensor => {
                let per_class = self.class_contributions(row)?;
                let n_classes = per_class.len();
                let tensor = Array::from_shape_fn(
                    IxDyn(&[1, self.n_features, n_classes]),
                    |idx| per_class[idx[2]][idx[1]],
                );
                Ok(RawAttribution::Array(tensor))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{normalize, AttributionShape};

    /// Two features; feature 0 splits at 0.5, then feature 1 at 10
    fn binary_model(layout: ExplainerOutput) -> TreeEnsemble {
        TreeEnsemble {
            feature_names: Some(vec!["a".to_string(), "b".to_string()]),
            n_features: 2,
            n_classes: 2,
            base_score: vec![-0.2],
            trees: vec![
                Tree {
                    output: 0,
                    nodes: vec![
                        Node::Split {
                            feature: 0,
                            threshold: 0.5,
                            left: 1,
                            right: 2,
                            default_left: false,
                            value: 0.1,
                        },
                        Node::Leaf { value: -0.4 },
                        Node::Split {
                            feature: 1,
                            threshold: 10.0,
                            left: 3,
                            right: 4,
                            default_left: true,
                            value: 0.6,
                        },
                        Node::Leaf { value: 0.3 },
                        Node::Leaf { value: 0.9 },
                    ],
                },
                Tree {
                    output: 0,
                    nodes: vec![
                        Node::Split {
                            feature: 1,
                            threshold: 5.0,
                            left: 1,
                            right: 2,
                            default_left: true,
                            value: 0.0,
                        },
                        Node::Leaf { value: -0.25 },
                        Node::Leaf { value: 0.25 },
                    ],
                },
            ],
            explainer_output: layout,
        }
    }

    fn three_class_model() -> TreeEnsemble {
        let stump = |output, lo, hi| Tree {
            output,
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 1.0,
                    left: 1,
                    right: 2,
                    default_left: true,
                    value: (lo + hi) / 2.0,
                },
                Node::Leaf { value: lo },
                Node::Leaf { value: hi },
            ],
        };
        TreeEnsemble {
            feature_names: None,
            n_features: 1,
            n_classes: 3,
            base_score: vec![0.0, 0.0, 0.0],
            trees: vec![stump(0, 1.0, -1.0), stump(1, 0.0, 0.0), stump(2, -1.0, 1.0)],
            explainer_output: ExplainerOutput::Tensor,
        }
    }

    #[test]
    fn test_margin_and_probability() {
        let model = binary_model(ExplainerOutput::Matrix);
        model.validate().unwrap();

        // right (0.6) then right (0.9); second tree right (0.25)
        let margins = model.margins(&[1.0, 12.0]).unwrap();
        assert!((margins[0] - (-0.2 + 0.9 + 0.25)).abs() < 1e-12);

        let proba = model.predict_proba(&[1.0, 12.0]).unwrap();
        assert_eq!(proba.len(), 2);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);
        assert_eq!(model.predict(&[1.0, 12.0]).unwrap(), 1);
        assert_eq!(model.predict(&[0.0, 0.0]).unwrap(), 0);
    }

    #[test]
    fn test_nan_follows_default_branch() {
        let model = binary_model(ExplainerOutput::Matrix);
        // feature 0 NaN goes right (default_left false); feature 1 NaN goes left
        let margins = model.margins(&[f64::NAN, f64::NAN]).unwrap();
        assert!((margins[0] - (-0.2 + 0.3 - 0.25)).abs() < 1e-12);
    }

    #[test]
    fn test_wrong_row_width_is_inference_error() {
        let model = binary_model(ExplainerOutput::Matrix);
        let err = model.predict(&[1.0]).unwrap_err();
        assert!(matches!(err, ModelError::Inference(_)));
    }

    #[test]
    fn test_contributions_sum_to_margin() {
        for layout in [
            ExplainerOutput::Matrix,
            ExplainerOutput::PerClassList,
            ExplainerOutput::Tensor,
        ] {
            let model = binary_model(layout);
            for row in [[0.0, 0.0], [1.0, 12.0], [1.0, 7.0], [f64::NAN, 3.0]] {
                let margin = model.margins(&row).unwrap()[0];
                let shape = AttributionShape::inspect(model.explain(&row).unwrap()).unwrap();
                let result = normalize(shape, &model.expected_value(), 1, 2).unwrap();
                assert!(
                    (result.raw_output() - margin).abs() < 1e-9,
                    "{:?} {:?}: {} vs {}",
                    layout,
                    row,
                    result.raw_output(),
                    margin
                );
            }
        }
    }

    #[test]
    fn test_binary_class_zero_is_negated() {
        let model = binary_model(ExplainerOutput::PerClassList);
        let row = [1.0, 12.0];
        let expected = model.expected_value();
        let ExpectedValue::PerClass(ev) = &expected else {
            panic!("expected per-class baseline, got {:?}", expected);
        };
        assert_eq!(ev.len(), 2);
        assert!((ev[0] + ev[1]).abs() < 1e-12);

        let shape = AttributionShape::inspect(model.explain(&row).unwrap()).unwrap();
        let zero = normalize(shape.clone(), &expected, 0, 2).unwrap();
        let one = normalize(shape, &expected, 1, 2).unwrap();
        for (a, b) in zero.contributions.iter().zip(&one.contributions) {
            assert!((a + b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_multiclass_softmax_and_tensor_attribution() {
        let model = three_class_model();
        model.validate().unwrap();

        let proba = model.predict_proba(&[2.0]).unwrap();
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(model.predict(&[2.0]).unwrap(), 2);
        assert_eq!(model.predict(&[0.0]).unwrap(), 0);

        let margins = model.margins(&[2.0]).unwrap();
        let expected = model.expected_value();
        let raw = model.explain(&[2.0]).unwrap();
        let shape = AttributionShape::inspect(raw).unwrap();
        for class in 0..3 {
            let result = normalize(shape.clone(), &expected, class, 1).unwrap();
            assert!((result.raw_output() - margins[class]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_validation_rejects_bad_structure() {
        let mut model = binary_model(ExplainerOutput::PerClassList);
        model.base_score = vec![0.0, 0.0];
        assert!(matches!(model.validate(), Err(ModelError::Invalid(_))));

        let mut model = binary_model(ExplainerOutput::PerClassList);
        model.trees[0].nodes[0] = Node::Split {
            feature: 5,
            threshold: 0.5,
            left: 1,
            right: 2,
            default_left: true,
            value: 0.0,
        };
        assert!(model.validate().unwrap_err().to_string().contains("feature 5"));

        let mut model = binary_model(ExplainerOutput::PerClassList);
        model.trees[1].nodes[0] = Node::Split {
            feature: 0,
            threshold: 0.5,
            left: 0,
            right: 2,
            default_left: true,
            value: 0.0,
        };
        assert!(model.validate().is_err());

        let mut model = three_class_model();
        model.explainer_output = ExplainerOutput::Matrix;
        assert!(model.validate().is_err());

        let mut model = three_class_model();
        model.n_classes = 1;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_node_kinds() {
        let model = binary_model(ExplainerOutput::Tensor);
        let text = serde_json::to_string(&model).unwrap();
        assert!(text.contains(r#""kind":"split""#));
        assert!(text.contains(r#""explainer_output":"tensor""#));
        assert_eq!(TreeEnsemble::from_json_str(&text).unwrap(), model);
    }
}
