//! End-to-end scoring over tree-ensemble artifacts written to disk.

use beneficiary_credit_scoring::config::{ArtifactConfig, ModelBackend};
use beneficiary_credit_scoring::error::ErrorPayload;
use beneficiary_credit_scoring::models::loader::ArtifactLoader;
use beneficiary_credit_scoring::types::applicant::MissingFieldPolicy;
use beneficiary_credit_scoring::types::result::Decision;
use beneficiary_credit_scoring::{ApplicantRecord, CreditScorer, RiskBand};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const REPAYMENT_FEATURES: &str = r#"["Age", "Income", "LoanAmount", "CreditScore",
    "Education_Master's", "HasCoSigner_Yes"]"#;

/// Default margin: +1.0 below a 600 credit score, +0.8 for loans of 200k or more.
const REPAYMENT_TREES: &str = r#"{
    "objective": "binary:logistic",
    "base_score": 0.0,
    "num_features": 6,
    "trees": [
        {"nodes": [
            {"feature": 3, "threshold": 600.0, "left": 1, "right": 2, "cover": 100.0},
            {"leaf": 1.0, "cover": 40.0},
            {"leaf": -1.5, "cover": 60.0}
        ]},
        {"nodes": [
            {"feature": 2, "threshold": 200000.0, "left": 1, "right": 2, "cover": 100.0},
            {"leaf": -0.5, "cover": 70.0},
            {"leaf": 0.8, "cover": 30.0}
        ]}
    ]
}"#;

const INCOME_FEATURES: &str =
    r#"["household_size_calculated", "fuel_expenditure", "comm_expenditure", "Sector_Urban"]"#;

/// log1p(MPCE) around 8.0, raised by fuel spend and urban residence.
const INCOME_TREES: &str = r#"{
    "objective": "reg:squarederror",
    "base_score": 8.0,
    "num_features": 4,
    "trees": [
        {"nodes": [
            {"feature": 1, "threshold": 1000.0, "left": 1, "right": 2, "cover": 100.0},
            {"leaf": -0.3, "cover": 50.0},
            {"leaf": 0.1, "cover": 50.0}
        ]},
        {"nodes": [
            {"feature": 3, "threshold": 0.5, "left": 1, "right": 2, "cover": 100.0},
            {"leaf": -0.1, "cover": 60.0},
            {"leaf": 0.2, "cover": 40.0}
        ]}
    ]
}"#;

fn artifacts(prefix: &str) -> ArtifactConfig {
    ArtifactConfig {
        model: format!("{}_model.json", prefix),
        explainer: format!("{}_model_explainer.json", prefix),
        features: format!("{}_model_features.json", prefix),
    }
}

fn write_artifacts(dir: &Path) {
    fs::write(dir.join("repayment_model.json"), REPAYMENT_TREES).unwrap();
    fs::write(dir.join("repayment_model_explainer.json"), REPAYMENT_TREES).unwrap();
    fs::write(dir.join("repayment_model_features.json"), REPAYMENT_FEATURES).unwrap();
    fs::write(dir.join("income_model.json"), INCOME_TREES).unwrap();
    fs::write(dir.join("income_model_explainer.json"), INCOME_TREES).unwrap();
    fs::write(dir.join("income_model_features.json"), INCOME_FEATURES).unwrap();
}

fn scorer(dir: &Path, policy: MissingFieldPolicy) -> CreditScorer {
    let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
    let context = loader
        .load_context(dir, &artifacts("repayment"), &artifacts("income"))
        .unwrap();
    CreditScorer::new(Arc::new(context), policy)
}

#[test]
fn scores_reference_applicant() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let scorer = scorer(dir.path(), MissingFieldPolicy::ZeroFill);

    let result = scorer.score(&ApplicantRecord::example()).unwrap();

    // margin -1.5 - 0.5 = -2.0
    let repayment = 1.0 - 1.0 / (1.0 + 2.0f64.exp());
    assert!((result.repayment_score - repayment).abs() < 1e-4);

    // log prediction 8.0 + 0.1 - 0.1
    let predicted = 8.0f64.exp_m1();
    assert!((result.predicted_income_value - predicted).abs() < 0.01);
    let income = 1.0 / (1.0 + (-(predicted - 3500.0) / 1000.0).exp());
    assert!((result.income_score - income).abs() < 1e-4);

    assert!((result.composite_score - (0.6 * repayment + 0.4 * income)).abs() < 1e-4);
    assert_eq!(result.risk_band, RiskBand::LowRiskHighNeed);
    assert_eq!(result.decision, Decision::AutoApprove);

    // repeated scoring is stable
    assert_eq!(scorer.score(&ApplicantRecord::example()).unwrap(), result);
}

#[test]
fn result_serializes_with_wire_names() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let scorer = scorer(dir.path(), MissingFieldPolicy::ZeroFill);

    let result = scorer.score(&ApplicantRecord::example()).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["risk_band"], "Low Risk - High Need");
    assert!(json["income_proxy_score"].is_number());
    assert!(json["predicted_mpce"].is_number());
    assert_eq!(json["decision"], "auto_approve");
}

#[test]
fn thin_file_applicant_is_zero_filled() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let scorer = scorer(dir.path(), MissingFieldPolicy::ZeroFill);

    let record = ApplicantRecord {
        credit_score: None,
        sector: None,
        ..ApplicantRecord::example()
    };
    let result = scorer.score(&record).unwrap();

    // missing credit score encodes as 0 and lands in the high-risk leaf
    assert!(result.repayment_score < 0.65);
    assert_eq!(result.risk_band, RiskBand::HighRiskHighNeed);
    assert_eq!(result.decision, Decision::ManualReview);

    let strict = self::scorer(dir.path(), MissingFieldPolicy::Reject);
    let err = strict.score(&record).unwrap_err();
    let payload = ErrorPayload::from(&err);
    assert_eq!(payload.error.kind, "invalid_record");
    let fields: Vec<_> = payload.error.violations.iter().map(|v| v.field.as_str()).collect();
    assert_eq!(fields, vec!["CreditScore", "Sector"]);
}

#[test]
fn explanations_are_locally_accurate() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let scorer = scorer(dir.path(), MissingFieldPolicy::ZeroFill);

    let payload = scorer.explain(&ApplicantRecord::example()).unwrap();

    // repayment attributions explain the default class margin (-2.0)
    let repayment = &payload.repayment_explanation;
    assert_eq!(repayment.feature_names.len(), 6);
    assert_eq!(repayment.feature_names[4], "Education_Master_s");
    let total = repayment.base_value + repayment.shap_values.iter().sum::<f64>();
    assert!((total - (-2.0)).abs() < 1e-9);
    // only CreditScore and LoanAmount drive the margin
    assert_eq!(repayment.shap_values[0], 0.0);
    assert!(repayment.shap_values[3] < 0.0);
    assert_eq!(repayment.feature_values[3], 750.0);

    let income = &payload.income_explanation;
    assert_eq!(income.feature_names[3], "Sector_Urban");
    let total = income.base_value + income.shap_values.iter().sum::<f64>();
    assert!((total - 8.0).abs() < 1e-9);
}

#[test]
fn missing_artifact_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    fs::remove_file(dir.path().join("income_model_explainer.json")).unwrap();

    let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
    let err = loader
        .load_context(dir.path(), &artifacts("repayment"), &artifacts("income"))
        .err()
        .unwrap();

    assert_eq!(err.kind(), "startup_load_failure");
    assert!(err.to_string().contains("income explainer"));
}

#[test]
fn explainer_schema_mismatch_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    fs::write(
        dir.path().join("repayment_model_features.json"),
        r#"["Age", "Income", "LoanAmount", "CreditScore"]"#,
    )
    .unwrap();

    let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
    let err = loader
        .load_context(dir.path(), &artifacts("repayment"), &artifacts("income"))
        .err()
        .unwrap();

    assert_eq!(err.kind(), "startup_load_failure");
}
