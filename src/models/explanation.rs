//! Per-feature attributions for both models.
//!
//! Explanations consume the same encoded vectors scoring does and never feed
//! back into the composite score.

use crate::error::ScoringError;
use crate::feature_encoder::EncodedFeatureVector;
use crate::models::Explainer;
use crate::types::result::ModelExplanation;

/// Output explained for the repayment model: the default class. Scoring
/// uses the non-default class, so the two must not be conflated.
pub const REPAYMENT_EXPLAINED_CLASS: usize = 1;

/// Output explained for the income model.
pub const INCOME_EXPLAINED_OUTPUT: usize = 0;

/// Explain one output of a model for an encoded vector.
pub fn explain_output(
    model: &str,
    explainer: &dyn Explainer,
    features: &EncodedFeatureVector,
    output: usize,
) -> Result<ModelExplanation, ScoringError> {
    let attribution = explainer.explain(features)?;

    let (base_value, values) = attribution.output(output).ok_or_else(|| {
        ScoringError::inference(
            model,
            format!(
                "explainer returned {} output(s), output {} requested",
                attribution.values.len(),
                output
            ),
        )
    })?;

    if values.len() != features.len() {
        return Err(ScoringError::inference(
            model,
            format!(
                "explainer returned {} attributions for {} features",
                values.len(),
                features.len()
            ),
        ));
    }

    Ok(ModelExplanation {
        base_value,
        shap_values: values.to_vec(),
        feature_names: features.columns().to_vec(),
        feature_values: features.values().to_vec(),
    })
}
