//! Scoring outputs: composite results, explanations and decision events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk band combining repayment risk and income-based need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    #[serde(rename = "Low Risk - High Need")]
    LowRiskHighNeed,
    #[serde(rename = "Low Risk - Low Need")]
    LowRiskLowNeed,
    #[serde(rename = "High Risk - High Need")]
    HighRiskHighNeed,
    #[serde(rename = "High Risk - Low Need")]
    HighRiskLowNeed,
}

impl RiskBand {
    pub const ALL: [RiskBand; 4] = [
        RiskBand::LowRiskHighNeed,
        RiskBand::LowRiskLowNeed,
        RiskBand::HighRiskHighNeed,
        RiskBand::HighRiskLowNeed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RiskBand::LowRiskHighNeed => "Low Risk - High Need",
            RiskBand::LowRiskLowNeed => "Low Risk - Low Need",
            RiskBand::HighRiskHighNeed => "High Risk - High Need",
            RiskBand::HighRiskLowNeed => "High Risk - Low Need",
        }
    }

    pub fn is_low_risk(&self) -> bool {
        self.label().contains("Low Risk")
    }

    /// Consumer-side decision rule: every "Low Risk" band auto-approves.
    pub fn decision(&self) -> Decision {
        if self.is_low_risk() {
            Decision::AutoApprove
        } else {
            Decision::ManualReview
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lending decision rendered from a risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoApprove,
    ManualReview,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoApprove => "auto_approve",
            Decision::ManualReview => "manual_review",
        }
    }
}

/// Externally visible scoring result. Scores are rounded to 4 decimals,
/// the predicted income value to 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub repayment_score: f64,
    #[serde(rename = "income_proxy_score")]
    pub income_score: f64,
    /// Estimated monthly per-capita expenditure, in currency units
    #[serde(rename = "predicted_mpce")]
    pub predicted_income_value: f64,
    pub composite_score: f64,
    pub risk_band: RiskBand,
    pub decision: Decision,
}

/// Per-feature attributions for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelExplanation {
    /// Baseline (expected) model output the attributions are relative to
    pub base_value: f64,
    pub shap_values: Vec<f64>,
    pub feature_names: Vec<String>,
    pub feature_values: Vec<f64>,
}

/// Attributions for both models, computed from the same encoded vectors
/// used for scoring. The repayment attributions explain the default class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationPayload {
    pub repayment_explanation: ModelExplanation,
    pub income_explanation: ModelExplanation,
}

/// Event published for every scored application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub event_id: String,
    pub application_id: String,
    pub risk_band: RiskBand,
    pub decision: Decision,
    pub composite_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl DecisionEvent {
    pub fn new(application_id: impl Into<String>, result: &CompositeResult) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            application_id: application_id.into(),
            risk_band: result.risk_band,
            decision: result.decision,
            composite_score: result.composite_score,
            timestamp: Utc::now(),
        }
    }
}
