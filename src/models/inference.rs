//! Two-model credit scorer: repayment scoring, income estimation,
//! aggregation and explanation over a shared, immutable model context.

use crate::config::AppConfig;
use crate::error::ScoringError;
use crate::feature_encoder::EncodedFeatureVector;
use crate::models::aggregator::{ScoreAggregator, ScorePair};
use crate::models::explanation::{explain_output, INCOME_EXPLAINED_OUTPUT, REPAYMENT_EXPLAINED_CLASS};
use crate::models::loader::ArtifactLoader;
use crate::models::ModelContext;
use crate::types::applicant::{ApplicantRecord, MissingFieldPolicy};
use crate::types::result::{CompositeResult, ExplanationPayload};
use std::sync::Arc;
use tracing::{debug, info};

/// Income value that maps to an income score of exactly 0.5.
pub const INCOME_CENTER: f64 = 3_500.0;
/// Spread of the income sigmoid, in currency units.
pub const INCOME_STEEPNESS: f64 = 1_000.0;

/// Undo the `log1p` transform the income model was trained under.
pub fn invert_log_transform(log_prediction: f64) -> f64 {
    log_prediction.exp_m1()
}

/// Logistic normalization of a predicted income value into [0, 1].
pub fn income_sigmoid(predicted_value: f64) -> f64 {
    1.0 / (1.0 + (-(predicted_value - INCOME_CENTER) / INCOME_STEEPNESS).exp())
}

/// Output of the income estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncomeEstimate {
    /// Estimated monthly per-capita expenditure, in currency units
    pub predicted_value: f64,
    pub income_score: f64,
}

/// Encoded vectors for both models, built from one record.
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    pub repayment: EncodedFeatureVector,
    pub income: EncodedFeatureVector,
}

/// Scoring and explanation entry point.
///
/// Holds no mutable state; one instance can serve concurrent requests.
pub struct CreditScorer {
    context: Arc<ModelContext>,
    aggregator: ScoreAggregator,
    missing_fields: MissingFieldPolicy,
}

impl CreditScorer {
    pub fn new(context: Arc<ModelContext>, missing_fields: MissingFieldPolicy) -> Self {
        Self {
            context,
            aggregator: ScoreAggregator::default(),
            missing_fields,
        }
    }

    /// Load every artifact named by the configuration. Fails if any is
    /// missing or corrupt.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScoringError> {
        let loader = ArtifactLoader::from_config(&config.models)?;
        let context = loader.load_configured(&config.models)?;

        info!(
            backend = ?config.models.backend,
            repayment_features = context.repayment.encoder.schema().len(),
            income_features = context.income.encoder.schema().len(),
            missing_fields = ?config.scoring.missing_fields,
            "Credit scorer initialized"
        );

        Ok(Self::new(Arc::new(context), config.scoring.missing_fields))
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn missing_field_policy(&self) -> MissingFieldPolicy {
        self.missing_fields
    }

    /// Validate the record and encode it once per model.
    pub fn prepare(&self, record: &ApplicantRecord) -> Result<PreparedFeatures, ScoringError> {
        record.validate(self.missing_fields)?;

        Ok(PreparedFeatures {
            repayment: self.context.repayment.encoder.encode(record),
            income: self.context.income.encoder.encode(record),
        })
    }

    /// Probability of non-default from the repayment model.
    pub fn repayment_score(&self, features: &EncodedFeatureVector) -> Result<f64, ScoringError> {
        let [no_default, _default] = self.context.repayment.model.predict_proba(features)?;

        if !no_default.is_finite() {
            return Err(ScoringError::inference("repayment", "non-finite probability"));
        }
        Ok(no_default.clamp(0.0, 1.0))
    }

    /// Predicted income value and its normalized score.
    pub fn estimate_income(&self, features: &EncodedFeatureVector) -> Result<IncomeEstimate, ScoringError> {
        let log_prediction = self.context.income.model.predict(features)?;
        let predicted_value = invert_log_transform(log_prediction);

        if !predicted_value.is_finite() {
            return Err(ScoringError::inference(
                "income",
                format!("log prediction {} does not invert to a finite value", log_prediction),
            ));
        }

        Ok(IncomeEstimate {
            predicted_value,
            income_score: income_sigmoid(predicted_value),
        })
    }

    /// Score an applicant. All-or-nothing: any failure yields no result.
    pub fn score(&self, record: &ApplicantRecord) -> Result<CompositeResult, ScoringError> {
        let prepared = self.prepare(record)?;

        let repayment_score = self.repayment_score(&prepared.repayment)?;
        let income = self.estimate_income(&prepared.income)?;

        let result = self.aggregator.aggregate(
            ScorePair::new(repayment_score, income.income_score),
            income.predicted_value,
        );

        debug!(
            repayment_score = result.repayment_score,
            income_score = result.income_score,
            composite_score = result.composite_score,
            risk_band = %result.risk_band,
            "Applicant scored"
        );

        Ok(result)
    }

    /// Attributions for both models over the same encoded vectors `score` uses.
    pub fn explain(&self, record: &ApplicantRecord) -> Result<ExplanationPayload, ScoringError> {
        let prepared = self.prepare(record)?;

        let repayment_explanation = explain_output(
            "repayment",
            self.context.repayment.explainer.as_ref(),
            &prepared.repayment,
            REPAYMENT_EXPLAINED_CLASS,
        )?;
        let income_explanation = explain_output(
            "income",
            self.context.income.explainer.as_ref(),
            &prepared.income,
            INCOME_EXPLAINED_OUTPUT,
        )?;

        Ok(ExplanationPayload {
            repayment_explanation,
            income_explanation,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feature_encoder::{FeatureSchema, SchemaAligner};
    use crate::models::{
        Attribution, BinaryClassifier, Explainer, IncomeModel, Regressor, RepaymentModel,
    };
    use crate::types::applicant::{Education, YesNo};
    use crate::types::result::{Decision, RiskBand};
    use proptest::prelude::*;

    /// Default probability rises with the loan-to-income ratio.
    struct LinearClassifier;

    impl BinaryClassifier for LinearClassifier {
        fn predict_proba(&self, features: &EncodedFeatureVector) -> Result<[f64; 2], ScoringError> {
            let income = features.get("Income").unwrap_or(0.0);
            let loan = features.get("LoanAmount").unwrap_or(0.0);
            let default = (loan / (income + loan + 1.0)).clamp(0.0, 1.0);
            Ok([1.0 - default, default])
        }
    }

    /// Log-scale expenditure driven by fuel and communication spend.
    struct LogSpendRegressor;

    impl Regressor for LogSpendRegressor {
        fn predict(&self, features: &EncodedFeatureVector) -> Result<f64, ScoringError> {
            let spend = features.get("fuel_expenditure").unwrap_or(0.0)
                + features.get("comm_expenditure").unwrap_or(0.0);
            Ok((spend * 2.0).ln_1p())
        }
    }

    struct FailingRegressor;

    impl Regressor for FailingRegressor {
        fn predict(&self, _: &EncodedFeatureVector) -> Result<f64, ScoringError> {
            Err(ScoringError::inference("income", "input shape mismatch"))
        }
    }

    struct FixedClassifier(f64);

    impl BinaryClassifier for FixedClassifier {
        fn predict_proba(&self, _: &EncodedFeatureVector) -> Result<[f64; 2], ScoringError> {
            Ok([self.0, 1.0 - self.0])
        }
    }

    struct FixedLogRegressor(f64);

    impl Regressor for FixedLogRegressor {
        fn predict(&self, _: &EncodedFeatureVector) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    /// Attributes everything to the first feature.
    struct FirstFeatureExplainer {
        classes: usize,
    }

    impl Explainer for FirstFeatureExplainer {
        fn explain(&self, features: &EncodedFeatureVector) -> Result<Attribution, ScoringError> {
            let mut values = vec![0.0; features.len()];
            values[0] = 1.0;
            let mut negated = values.clone();
            negated[0] = -1.0;

            Ok(if self.classes == 2 {
                Attribution {
                    expected_values: vec![0.3, -0.3],
                    values: vec![negated, values],
                }
            } else {
                Attribution {
                    expected_values: vec![7.9],
                    values: vec![values],
                }
            })
        }
    }

    pub(crate) fn repayment_schema() -> FeatureSchema {
        FeatureSchema::new([
            "Age",
            "Income",
            "LoanAmount",
            "CreditScore",
            "Education_High School",
            "Education_Master's",
            "HasCoSigner_Yes",
        ])
    }

    pub(crate) fn income_schema() -> FeatureSchema {
        FeatureSchema::new([
            "household_size_calculated",
            "fuel_expenditure",
            "comm_expenditure",
            "Sector_Urban",
            "Land_Ownership_Yes",
        ])
    }

    fn context_with(
        classifier: Box<dyn BinaryClassifier>,
        regressor: Box<dyn Regressor>,
    ) -> Arc<ModelContext> {
        Arc::new(ModelContext {
            repayment: RepaymentModel {
                model: classifier,
                explainer: Box::new(FirstFeatureExplainer { classes: 2 }),
                encoder: SchemaAligner::repayment(repayment_schema()),
            },
            income: IncomeModel {
                model: regressor,
                explainer: Box::new(FirstFeatureExplainer { classes: 1 }),
                encoder: SchemaAligner::income(income_schema()),
            },
        })
    }

    pub(crate) fn test_scorer() -> CreditScorer {
        CreditScorer::new(
            context_with(Box::new(LinearClassifier), Box::new(LogSpendRegressor)),
            MissingFieldPolicy::ZeroFill,
        )
    }

    /// Scorer whose models return fixed outputs, so sub-scores are known exactly.
    fn fixed_scorer(no_default: f64, predicted_value: f64) -> CreditScorer {
        CreditScorer::new(
            context_with(
                Box::new(FixedClassifier(no_default)),
                Box::new(FixedLogRegressor(predicted_value.ln_1p())),
            ),
            MissingFieldPolicy::ZeroFill,
        )
    }

    #[test]
    fn test_income_sigmoid_center_is_exactly_half() {
        assert_eq!(income_sigmoid(INCOME_CENTER), 0.5);
        assert!(income_sigmoid(10_000.0) > 0.99);
        assert!(income_sigmoid(0.0) < 0.05);
    }

    #[test]
    fn test_invert_log_transform_round_trip() {
        for value in [0.0, 1.0, 3_500.0, 12_345.67] {
            let log_prediction = f64::ln_1p(value);
            assert!((invert_log_transform(log_prediction) - value).abs() < 1e-9 * value.max(1.0));
        }
        assert!((invert_log_transform(2.0) - (2.0f64.exp() - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_score_example_record() {
        let scorer = test_scorer();
        let result = scorer.score(&ApplicantRecord::example()).unwrap();

        // default = 100000 / 600001
        let expected_repayment = 1.0 - 100_000.0 / 600_001.0;
        assert!((result.repayment_score - expected_repayment).abs() < 1e-4);
        // predicted spend = 2 * (1250 + 450)
        assert_eq!(result.predicted_income_value, 3_400.0);
        assert!((result.income_score - income_sigmoid(3_400.0)).abs() < 1e-4);
        assert_eq!(result.risk_band, RiskBand::LowRiskHighNeed);
        assert_eq!(result.decision, Decision::AutoApprove);
    }

    #[test]
    fn test_end_to_end_low_risk_high_need() {
        // income score 0.30 requires a predicted value of 3500 + 1000 * ln(0.3 / 0.7)
        let predicted = INCOME_CENTER + INCOME_STEEPNESS * (0.3f64 / 0.7).ln();
        let result = fixed_scorer(0.80, predicted)
            .score(&ApplicantRecord::example())
            .unwrap();

        assert_eq!(result.repayment_score, 0.8);
        assert_eq!(result.income_score, 0.3);
        assert_eq!(result.composite_score, 0.6);
        assert_eq!(result.risk_band, RiskBand::LowRiskHighNeed);
        assert_eq!(result.decision, Decision::AutoApprove);
    }

    #[test]
    fn test_end_to_end_high_risk_low_need() {
        let predicted = INCOME_CENTER + INCOME_STEEPNESS * (0.7f64 / 0.3).ln();
        let result = fixed_scorer(0.50, predicted)
            .score(&ApplicantRecord::example())
            .unwrap();

        assert_eq!(result.composite_score, 0.58);
        assert_eq!(result.risk_band, RiskBand::HighRiskLowNeed);
        assert_eq!(result.decision, Decision::ManualReview);
    }

    #[test]
    fn test_boundary_scores_fall_on_high_risk_high_need() {
        // repayment exactly at the threshold is not low risk
        let result = fixed_scorer(0.65, INCOME_CENTER - 10.0)
            .score(&ApplicantRecord::example())
            .unwrap();

        assert_eq!(result.repayment_score, 0.65);
        assert_eq!(result.income_score, 0.4975);
        assert_eq!(result.risk_band, RiskBand::HighRiskHighNeed);
        assert_eq!(result.decision, Decision::ManualReview);
    }

    #[test]
    fn test_missing_categorical_still_scores() {
        let scorer = test_scorer();
        let record = ApplicantRecord {
            education: None,
            has_co_signer: None,
            sector: None,
            ..ApplicantRecord::example()
        };

        let prepared = scorer.prepare(&record).unwrap();
        assert_eq!(prepared.repayment.len(), repayment_schema().len());
        assert_eq!(prepared.repayment.get("Education_High_School"), Some(0.0));
        assert_eq!(prepared.repayment.get("Education_Master_s"), Some(0.0));
        assert_eq!(prepared.repayment.get("HasCoSigner_Yes"), Some(0.0));
        assert_eq!(prepared.income.get("Sector_Urban"), Some(0.0));

        assert!(scorer.score(&record).is_ok());
    }

    #[test]
    fn test_reject_policy_refuses_incomplete_records() {
        let scorer = CreditScorer::new(
            context_with(Box::new(LinearClassifier), Box::new(LogSpendRegressor)),
            MissingFieldPolicy::Reject,
        );
        let record = ApplicantRecord {
            education: None,
            ..ApplicantRecord::example()
        };

        let err = scorer.score(&record).unwrap_err();
        assert_eq!(err.kind(), "invalid_record");
        assert!(scorer.score(&ApplicantRecord::example()).is_ok());
    }

    #[test]
    fn test_inference_failure_is_reported() {
        let scorer = CreditScorer::new(
            context_with(Box::new(LinearClassifier), Box::new(FailingRegressor)),
            MissingFieldPolicy::ZeroFill,
        );

        let err = scorer.score(&ApplicantRecord::example()).unwrap_err();
        assert_eq!(err.kind(), "inference_failure");
        // the shared context survives and keeps serving
        assert!(scorer.explain(&ApplicantRecord::example()).is_ok());
    }

    #[test]
    fn test_non_finite_income_is_inference_failure() {
        let scorer = CreditScorer::new(
            context_with(Box::new(LinearClassifier), Box::new(FixedLogRegressor(1e6))),
            MissingFieldPolicy::ZeroFill,
        );
        assert_eq!(
            scorer.score(&ApplicantRecord::example()).unwrap_err().kind(),
            "inference_failure"
        );
    }

    #[test]
    fn test_explain_uses_encoded_vectors() {
        let scorer = test_scorer();
        let record = ApplicantRecord {
            education: Some(Education::Masters),
            has_co_signer: Some(YesNo::Yes),
            ..ApplicantRecord::example()
        };

        let payload = scorer.explain(&record).unwrap();
        let repayment = &payload.repayment_explanation;
        assert_eq!(repayment.base_value, -0.3);
        assert_eq!(repayment.shap_values[0], 1.0);
        assert_eq!(repayment.feature_names[5], "Education_Master_s");
        assert_eq!(repayment.feature_values[5], 1.0);
        assert_eq!(repayment.feature_values[6], 1.0);

        let income = &payload.income_explanation;
        assert_eq!(income.base_value, 7.9);
        assert_eq!(income.feature_names, income_schema().columns());
    }

    fn arbitrary_record() -> impl Strategy<Value = ApplicantRecord> {
        (
            18u32..=100,
            0.0f64..=1_000_000.0,
            10_000.0f64..=1_000_000.0,
            0.0f64..=5_000.0,
            0.0f64..=3_000.0,
            proptest::option::of(0usize..Education::ALL.len()),
        )
            .prop_map(|(age, income, loan, fuel, comm, education)| ApplicantRecord {
                age: Some(age),
                income: Some(income),
                loan_amount: Some(loan),
                fuel_expenditure: Some(fuel),
                comm_expenditure: Some(comm),
                education: education.map(|i| Education::ALL[i]),
                ..ApplicantRecord::example()
            })
    }

    proptest! {
        #[test]
        fn scores_stay_in_unit_interval(record in arbitrary_record()) {
            let result = test_scorer().score(&record).unwrap();
            prop_assert!((0.0..=1.0).contains(&result.repayment_score));
            prop_assert!((0.0..=1.0).contains(&result.income_score));
            prop_assert!((0.0..=1.0).contains(&result.composite_score));
            prop_assert!(
                (result.composite_score - (0.6 * result.repayment_score + 0.4 * result.income_score)).abs() <= 2e-4
            );
        }

        #[test]
        fn scoring_is_idempotent(record in arbitrary_record()) {
            let scorer = test_scorer();
            prop_assert_eq!(scorer.score(&record).unwrap(), scorer.score(&record).unwrap());
        }
    }
}
