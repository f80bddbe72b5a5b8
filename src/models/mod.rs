//! Model inference components
//!
//! Predictive models and explainers sit behind small traits so the scorer
//! works the same over ONNX sessions, JSON tree ensembles, or test doubles.

pub mod aggregator;
pub mod explanation;
pub mod inference;
pub mod loader;
pub mod onnx;
pub mod tree_ensemble;

pub use aggregator::ScoreAggregator;
pub use inference::CreditScorer;
pub use loader::ArtifactLoader;

use crate::error::ScoringError;
use crate::feature_encoder::{EncodedFeatureVector, SchemaAligner};

/// Two-class probabilistic model.
pub trait BinaryClassifier: Send + Sync {
    /// Class probabilities `[P(class 0), P(class 1)]`.
    fn predict_proba(&self, features: &EncodedFeatureVector) -> Result<[f64; 2], ScoringError>;
}

/// Single-output regression model.
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &EncodedFeatureVector) -> Result<f64, ScoringError>;
}

/// Additive per-feature attributions for one or more model outputs.
pub trait Explainer: Send + Sync {
    fn explain(&self, features: &EncodedFeatureVector) -> Result<Attribution, ScoringError>;
}

/// Attribution sets, one per model output (class).
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    /// Baseline output per class
    pub expected_values: Vec<f64>,
    /// Per-feature contributions per class
    pub values: Vec<Vec<f64>>,
}

impl Attribution {
    /// Baseline and contributions for one output.
    pub fn output(&self, index: usize) -> Option<(f64, &[f64])> {
        let expected = *self.expected_values.get(index)?;
        let values = self.values.get(index)?;
        Some((expected, values.as_slice()))
    }
}

/// Repayment model with its explainer and encoder.
pub struct RepaymentModel {
    pub model: Box<dyn BinaryClassifier>,
    pub explainer: Box<dyn Explainer>,
    pub encoder: SchemaAligner,
}

/// Income model with its explainer and encoder.
pub struct IncomeModel {
    pub model: Box<dyn Regressor>,
    pub explainer: Box<dyn Explainer>,
    pub encoder: SchemaAligner,
}

/// Every artifact the scorer needs, loaded once and shared read-only.
pub struct ModelContext {
    pub repayment: RepaymentModel,
    pub income: IncomeModel,
}
