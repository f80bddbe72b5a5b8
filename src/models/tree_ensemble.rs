//! Gradient-boosted tree ensembles loaded from JSON.
//!
//! The same artifact format backs the `tree` prediction backend and every
//! explainer. Attributions are exact path-dependent TreeSHAP values: for each
//! tree, the cover-weighted conditional expectation is split fairly among the
//! features on the decision path, so that
//! `expected_value + sum(attributions) == margin` for every input.

use crate::error::ScoringError;
use crate::feature_encoder::EncodedFeatureVector;
use crate::models::{Attribution, BinaryClassifier, Explainer, Regressor};
use serde::{Deserialize, Serialize};

/// Learning objective of the ensemble; decides how margins are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    /// Margin is a log-odds of the positive class
    #[serde(rename = "binary:logistic")]
    BinaryLogistic,
    /// Margin is the predicted value
    #[serde(rename = "reg:squarederror", alias = "reg:linear")]
    SquaredError,
}

/// One tree node. Children are referenced by index into the tree's node list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default = "default_left")]
        default_left: bool,
        cover: f64,
    },
    Leaf {
        leaf: f64,
        cover: f64,
    },
}

fn default_left() -> bool {
    true
}

impl Node {
    fn cover(&self) -> f64 {
        match *self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// Missing values follow the node's default branch, otherwise `x < threshold` goes left.
fn goes_left(value: f64, threshold: f64, default_left: bool) -> bool {
    if value.is_nan() {
        default_left
    } else {
        value < threshold
    }
}

impl Tree {
    fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { leaf, .. } => return leaf,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                    ..
                } => {
                    index = if goes_left(x[feature], threshold, default_left) {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    fn expected_value(&self, index: usize) -> f64 {
        match self.nodes[index] {
            Node::Leaf { leaf, .. } => leaf,
            Node::Split {
                left, right, cover, ..
            } => {
                let left_cover = self.nodes[left].cover();
                let right_cover = self.nodes[right].cover();
                (left_cover * self.expected_value(left) + right_cover * self.expected_value(right))
                    / cover
            }
        }
    }

    fn validate(&self, num_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (index, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    feature,
                    left,
                    right,
                    cover,
                    ..
                } => {
                    if feature >= num_features {
                        return Err(format!(
                            "node {} splits on feature {} but the ensemble has {} features",
                            index, feature, num_features
                        ));
                    }
                    // Children must come after their parent, which rules out cycles.
                    for child in [left, right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", index, child));
                        }
                    }
                    if !(cover > 0.0) {
                        return Err(format!("split node {} has non-positive cover", index));
                    }
                }
                Node::Leaf { leaf, cover } => {
                    if !leaf.is_finite() || !(cover >= 0.0) {
                        return Err(format!("leaf {} has invalid value or cover", index));
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

fn extend_path(
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / (depth + 1) as f64;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / (depth + 1) as f64;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let previous = path[i].weight;
            path[i].weight = next_one_portion * (depth + 1) as f64 / ((i + 1) as f64 * one_fraction);
            next_one_portion = previous
                - path[i].weight * zero_fraction * (depth - i) as f64 / (depth + 1) as f64;
        } else {
            path[i].weight =
                path[i].weight * (depth + 1) as f64 / (zero_fraction * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let mut next_one_portion = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let portion = next_one_portion * (depth + 1) as f64 / ((i + 1) as f64 * one_fraction);
            total += portion;
            next_one_portion = path[i].weight
                - portion * zero_fraction * ((depth - i) as f64 / (depth + 1) as f64);
        } else if zero_fraction != 0.0 {
            total += (path[i].weight / zero_fraction) / ((depth - i) as f64 / (depth + 1) as f64);
        }
    }

    total
}

#[allow(clippy::too_many_arguments)]
fn tree_shap(
    tree: &Tree,
    index: usize,
    x: &[f64],
    phi: &mut [f64],
    parent_path: &[PathElement],
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let mut path = parent_path.to_vec();
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    match tree.nodes[index] {
        Node::Leaf { leaf, .. } => {
            for i in 1..path.len() {
                let weight = unwound_path_sum(&path, i);
                let element = path[i];
                if let Some(f) = element.feature {
                    phi[f] += weight * (element.one_fraction - element.zero_fraction) * leaf;
                }
            }
        }
        Node::Split {
            feature: split,
            threshold,
            left,
            right,
            default_left,
            cover,
        } => {
            let (hot, cold) = if goes_left(x[split], threshold, default_left) {
                (left, right)
            } else {
                (right, left)
            };
            let hot_zero_fraction = tree.nodes[hot].cover() / cover;
            let cold_zero_fraction = tree.nodes[cold].cover() / cover;

            // A feature already on the path is unwound and its fractions carried down.
            let mut incoming_zero_fraction = 1.0;
            let mut incoming_one_fraction = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(split)) {
                incoming_zero_fraction = path[k].zero_fraction;
                incoming_one_fraction = path[k].one_fraction;
                unwind_path(&mut path, k);
            }

            tree_shap(
                tree,
                hot,
                x,
                phi,
                &path,
                hot_zero_fraction * incoming_zero_fraction,
                incoming_one_fraction,
                Some(split),
            );
            tree_shap(
                tree,
                cold,
                x,
                phi,
                &path,
                cold_zero_fraction * incoming_zero_fraction,
                0.0,
                Some(split),
            );
        }
    }
}

/// Additive tree ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub objective: Objective,
    /// Initial margin every prediction starts from
    #[serde(default)]
    pub base_score: f64,
    pub num_features: usize,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let ensemble: TreeEnsemble = serde_json::from_str(json).map_err(|e| e.to_string())?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_score.is_finite() {
            return Err("base_score is not finite".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.num_features)
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    fn check_width(&self, x: &[f64]) -> Result<(), String> {
        if x.len() != self.num_features {
            return Err(format!(
                "expected {} features, got {}",
                self.num_features,
                x.len()
            ));
        }
        Ok(())
    }

    /// Raw model output: `base_score` plus one leaf value per tree.
    pub fn margin(&self, x: &[f64]) -> Result<f64, String> {
        self.check_width(x)?;
        Ok(self.base_score + self.trees.iter().map(|t| t.leaf_value(x)).sum::<f64>())
    }

    /// Cover-weighted mean margin over the training distribution.
    pub fn expected_value(&self) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.expected_value(0)).sum::<f64>()
    }

    /// Per-feature TreeSHAP attributions of the margin.
    pub fn shap_values(&self, x: &[f64]) -> Result<Vec<f64>, String> {
        self.check_width(x)?;
        let mut phi = vec![0.0; self.num_features];
        for tree in &self.trees {
            tree_shap(tree, 0, x, &mut phi, &[], 1.0, 1.0, None);
        }
        Ok(phi)
    }
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Named tree ensemble implementing the model seams.
#[derive(Debug, Clone)]
pub struct TreeModel {
    name: String,
    ensemble: TreeEnsemble,
}

impl TreeModel {
    pub fn new(name: impl Into<String>, ensemble: TreeEnsemble) -> Self {
        Self {
            name: name.into(),
            ensemble,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ensemble(&self) -> &TreeEnsemble {
        &self.ensemble
    }

    fn margin(&self, features: &EncodedFeatureVector) -> Result<f64, ScoringError> {
        self.ensemble
            .margin(features.values())
            .map_err(|e| ScoringError::inference(&self.name, e))
    }
}

impl BinaryClassifier for TreeModel {
    fn predict_proba(&self, features: &EncodedFeatureVector) -> Result<[f64; 2], ScoringError> {
        if self.ensemble.objective != Objective::BinaryLogistic {
            return Err(ScoringError::inference(
                &self.name,
                "ensemble objective is not binary:logistic",
            ));
        }
        let positive = sigmoid(self.margin(features)?);
        Ok([1.0 - positive, positive])
    }
}

impl Regressor for TreeModel {
    fn predict(&self, features: &EncodedFeatureVector) -> Result<f64, ScoringError> {
        if self.ensemble.objective != Objective::SquaredError {
            return Err(ScoringError::inference(
                &self.name,
                "ensemble objective is not a regression objective",
            ));
        }
        self.margin(features)
    }
}

impl Explainer for TreeModel {
    /// Binary ensembles yield a two-class set: index 0 explains the negative
    /// class (negated margin), index 1 the positive class.
    fn explain(&self, features: &EncodedFeatureVector) -> Result<Attribution, ScoringError> {
        let phi = self
            .ensemble
            .shap_values(features.values())
            .map_err(|e| ScoringError::inference(&self.name, e))?;
        let expected = self.ensemble.expected_value();

        Ok(match self.ensemble.objective {
            Objective::BinaryLogistic => Attribution {
                expected_values: vec![-expected, expected],
                values: vec![phi.iter().map(|v| -v).collect(), phi],
            },
            Objective::SquaredError => Attribution {
                expected_values: vec![expected],
                values: vec![phi],
            },
        })
    }
}
