//! Composite score aggregation and risk banding

use crate::types::result::{CompositeResult, RiskBand};

/// Weight of the repayment score in the composite.
pub const REPAYMENT_WEIGHT: f64 = 0.6;
/// Weight of the income score in the composite.
pub const INCOME_WEIGHT: f64 = 0.4;
/// Repayment scores strictly above this are low risk.
pub const LOW_RISK_THRESHOLD: f64 = 0.65;
/// Income scores at or below this indicate high need.
pub const INCOME_MIDPOINT: f64 = 0.5;

/// Repayment and income sub-scores for one applicant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorePair {
    pub repayment_score: f64,
    pub income_score: f64,
}

impl ScorePair {
    pub fn new(repayment_score: f64, income_score: f64) -> Self {
        Self {
            repayment_score,
            income_score,
        }
    }
}

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Blends sub-scores into a composite score and risk band.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    repayment_weight: f64,
    income_weight: f64,
}

impl ScoreAggregator {
    pub fn new(repayment_weight: f64, income_weight: f64) -> Self {
        Self {
            repayment_weight,
            income_weight,
        }
    }

    /// Weighted blend of the two sub-scores.
    pub fn composite(&self, pair: ScorePair) -> f64 {
        self.repayment_weight * pair.repayment_score + self.income_weight * pair.income_score
    }

    /// Risk band decision table.
    ///
    /// | repayment > 0.65 | income <= 0.5 | band                  |
    /// |------------------|---------------|-----------------------|
    /// | yes              | yes           | Low Risk - High Need  |
    /// | yes              | no            | Low Risk - Low Need   |
    /// | no               | yes           | High Risk - High Need |
    /// | no               | no            | High Risk - Low Need  |
    pub fn classify(pair: ScorePair) -> RiskBand {
        let low_risk = pair.repayment_score > LOW_RISK_THRESHOLD;
        let high_need = pair.income_score <= INCOME_MIDPOINT;

        match (low_risk, high_need) {
            (true, true) => RiskBand::LowRiskHighNeed,
            (true, false) => RiskBand::LowRiskLowNeed,
            (false, true) => RiskBand::HighRiskHighNeed,
            (false, false) => RiskBand::HighRiskLowNeed,
        }
    }

    /// Build the external result. Banding uses unrounded scores; outputs are
    /// rounded to 4 decimals (2 for the predicted income value).
    pub fn aggregate(&self, pair: ScorePair, predicted_income_value: f64) -> CompositeResult {
        let composite_score = self.composite(pair);
        let risk_band = Self::classify(pair);

        CompositeResult {
            repayment_score: round_to(pair.repayment_score, 4),
            income_score: round_to(pair.income_score, 4),
            predicted_income_value: round_to(predicted_income_value, 2),
            composite_score: round_to(composite_score, 4),
            risk_band,
            decision: risk_band.decision(),
        }
    }
}

impl Default for ScoreAggregator {
    fn default() -> Self {
        Self::new(REPAYMENT_WEIGHT, INCOME_WEIGHT)
    }
}
