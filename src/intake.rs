//! Application intake and loan simulation.
//!
//! An [`ApplicationForm`] holds what an applicant fills in. Turning it into an
//! [`ApplicantRecord`] applies statement-verified income and derives the two
//! engineered scores (`Asset_Score_X1`, `Scheme_Index_X2`).

use crate::error::ScoringError;
use crate::income_verification::{verify_income, IncomeVerification};
use crate::models::inference::CreditScorer;
use crate::types::applicant::ApplicantRecord;
use crate::types::result::{CompositeResult, Decision};
use serde::{Deserialize, Serialize};
use tracing::debug;

const CAR_POINTS: f64 = 5.0;
const REFRIGERATOR_POINTS: f64 = 2.0;
const WASHING_MACHINE_POINTS: f64 = 3.0;

/// Scheme index for households receiving major subsidy benefits (BPL).
pub const SUBSIDY_SCHEME_INDEX: f64 = 4.0;
/// Scheme index for all other households (APL).
pub const BASE_SCHEME_INDEX: f64 = 1.0;

/// Consumer durables owned by the household.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetHoldings {
    pub car: bool,
    pub refrigerator: bool,
    pub washing_machine: bool,
}

impl AssetHoldings {
    pub fn score(&self) -> f64 {
        [
            (self.car, CAR_POINTS),
            (self.refrigerator, REFRIGERATOR_POINTS),
            (self.washing_machine, WASHING_MACHINE_POINTS),
        ]
        .iter()
        .filter(|(owned, _)| *owned)
        .map(|(_, points)| points)
        .sum()
    }
}

pub fn scheme_index(receives_subsidy: bool) -> f64 {
    if receives_subsidy {
        SUBSIDY_SCHEME_INDEX
    } else {
        BASE_SCHEME_INDEX
    }
}

/// Monthly debt-to-income ratio. Non-positive income counts as fully indebted.
pub fn debt_to_income(monthly_emi: f64, monthly_income: f64) -> f64 {
    if monthly_income > 0.0 {
        monthly_emi / monthly_income
    } else {
        1.0
    }
}

/// Intake form: the applicant record as claimed plus the inputs the
/// engineered fields are derived from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationForm {
    /// Claimed values. `Income` is the claimed monthly income.
    #[serde(flatten)]
    pub applicant: ApplicantRecord,
    /// Total existing monthly EMIs
    #[serde(default)]
    pub existing_emi: f64,
    #[serde(default)]
    pub assets: AssetHoldings,
    #[serde(default)]
    pub receives_subsidy: bool,
    /// Extracted bank statement text, one entry per page
    #[serde(default)]
    pub statement_pages: Vec<String>,
}

/// Record ready for scoring, with the intake figures it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Intake {
    pub record: ApplicantRecord,
    /// Income used for scoring: verified when available, claimed otherwise
    pub net_monthly_income: f64,
    pub verification: Option<IncomeVerification>,
    /// Existing EMIs over net monthly income
    pub debt_to_income: f64,
}

impl ApplicationForm {
    /// Verify income and derive the engineered fields.
    pub fn assess(&self) -> Intake {
        let claimed_income = self.applicant.income.unwrap_or(0.0);

        let verification = if self.statement_pages.is_empty() {
            None
        } else {
            Some(verify_income(self.statement_pages.iter().map(String::as_str)))
        };

        let net_monthly_income = verification
            .as_ref()
            .and_then(IncomeVerification::verified_income)
            .filter(|income| *income > 0.0)
            .unwrap_or(claimed_income);

        let record = ApplicantRecord {
            income: Some(net_monthly_income),
            asset_score: Some(self.assets.score()),
            scheme_index: Some(scheme_index(self.receives_subsidy)),
            ..self.applicant.clone()
        };

        debug!(
            claimed_income = claimed_income,
            net_monthly_income = net_monthly_income,
            verified = verification.as_ref().and_then(|v| v.verified_income()).is_some(),
            "Application assessed"
        );

        Intake {
            record,
            net_monthly_income,
            verification,
            debt_to_income: debt_to_income(self.existing_emi, net_monthly_income),
        }
    }

    pub fn into_record(self) -> ApplicantRecord {
        self.assess().record
    }
}

/// What-if inputs for the loan simulator.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LoanScenario {
    pub monthly_income: f64,
    pub monthly_emi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub result: CompositeResult,
    /// Unclamped scenario DTI
    pub simulated_dti: f64,
    /// Composite score change against the baseline
    pub score_change: f64,
    pub decision: Decision,
}

/// Re-score `base` under a scenario: income replaced and `DTIRatio`
/// recomputed from the scenario EMI, capped at 1.0.
pub fn simulate(
    scorer: &CreditScorer,
    base: &ApplicantRecord,
    baseline: &CompositeResult,
    scenario: LoanScenario,
) -> Result<SimulationOutcome, ScoringError> {
    let simulated_dti = debt_to_income(scenario.monthly_emi, scenario.monthly_income);

    let record = ApplicantRecord {
        income: Some(scenario.monthly_income),
        dti_ratio: Some(simulated_dti.min(1.0)),
        ..base.clone()
    };

    let result = scorer.score(&record)?;
    let score_change = result.composite_score - baseline.composite_score;

    debug!(
        simulated_dti = simulated_dti,
        score_change = score_change,
        risk_band = %result.risk_band,
        "Loan scenario simulated"
    );

    Ok(SimulationOutcome {
        decision: result.decision,
        result,
        simulated_dti,
        score_change,
    })
}
