//! Test Applicant Generator
//!
//! Generates random loan applications and sends them to the scoring service
//! over NATS request/reply, logging each reply.

use beneficiary_credit_scoring::error::ErrorPayload;
use beneficiary_credit_scoring::intake::{ApplicationForm, AssetHoldings};
use beneficiary_credit_scoring::types::applicant::{
    DwellingType, Education, EmploymentType, IncomeActivity, LoanPurpose, MaritalStatus,
    RationCardType, Religion, Sector, SocialGroup, YesNo,
};
use beneficiary_credit_scoring::{ApplicantRecord, CompositeResult, ScoreRequest};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Application generator for load testing
struct ApplicantGenerator {
    rng: rand::rngs::ThreadRng,
    application_counter: u64,
}

impl ApplicantGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            application_counter: 0,
        }
    }

    fn pick<T: Copy>(&mut self, values: &[T]) -> T {
        values[self.rng.gen_range(0..values.len())]
    }

    /// A complete intake form with an optional bank statement
    fn generate_form(&mut self) -> ApplicationForm {
        let claimed_income = self.rng.gen_range(8_000.0..120_000.0_f64).round();

        let applicant = ApplicantRecord {
            age: Some(self.rng.gen_range(21..65)),
            income: Some(claimed_income),
            loan_amount: Some(self.rng.gen_range(10_000.0..500_000.0_f64).round()),
            credit_score: Some(self.rng.gen_range(300..900)),
            months_employed: Some(self.rng.gen_range(0..360)),
            num_credit_lines: Some(self.rng.gen_range(0..8)),
            interest_rate: Some((self.rng.gen_range(6.0..24.0_f64) * 10.0).round() / 10.0),
            loan_term: Some(self.pick(&[12, 24, 36, 48, 60])),
            dti_ratio: Some((self.rng.gen_range(0.05..0.8_f64) * 100.0).round() / 100.0),
            education: Some(self.pick(Education::ALL)),
            employment_type: Some(self.pick(EmploymentType::ALL)),
            marital_status: Some(self.pick(MaritalStatus::ALL)),
            has_mortgage: Some(self.pick(YesNo::ALL)),
            has_dependents: Some(self.pick(YesNo::ALL)),
            loan_purpose: Some(self.pick(LoanPurpose::ALL)),
            has_co_signer: Some(self.pick(YesNo::ALL)),
            sector: Some(self.pick(Sector::ALL)),
            social_group: Some(self.pick(SocialGroup::ALL)),
            income_activity: Some(self.pick(IncomeActivity::ALL)),
            dwelling_type: Some(self.pick(DwellingType::ALL)),
            land_ownership: Some(self.pick(YesNo::ALL)),
            ration_card_type: Some(self.pick(RationCardType::ALL)),
            religion: Some(self.pick(Religion::ALL)),
            head_of_household_age: Some(self.rng.gen_range(25..80)),
            household_size_calculated: Some(self.rng.gen_range(1..10)),
            avg_education_years_adults: Some((self.rng.gen_range(0.0..16.0_f64) * 10.0).round() / 10.0),
            num_internet_users: Some(self.rng.gen_range(0..5)),
            fuel_expenditure: Some(self.rng.gen_range(100.0..3_000.0_f64).round()),
            comm_expenditure: Some(self.rng.gen_range(50.0..1_500.0_f64).round()),
            asset_score: None,
            scheme_index: None,
        };

        // Roughly half of applicants attach a statement
        let statement_pages = if self.rng.gen_bool(0.5) {
            let salary = claimed_income * self.rng.gen_range(0.8..1.1);
            vec![format!(
                "05/04/2024 SALARY CREDIT EMPLOYER {:.2}\n12/04/2024 ATM WITHDRAWAL 2000.00\n05/05/2024 SAL-TRANSFER EMPLOYER {:.2}",
                salary, salary
            )]
        } else {
            Vec::new()
        };

        ApplicationForm {
            applicant,
            existing_emi: self.rng.gen_range(0.0..20_000.0_f64).round(),
            assets: AssetHoldings {
                car: self.rng.gen_bool(0.2),
                refrigerator: self.rng.gen_bool(0.6),
                washing_machine: self.rng.gen_bool(0.4),
            },
            receives_subsidy: self.rng.gen_bool(0.5),
            statement_pages,
        }
    }

    /// Score request for a generated applicant. Thin-file applicants omit
    /// their credit history fields.
    fn generate_request(&mut self, thin_file_rate: f64) -> ScoreRequest {
        self.application_counter += 1;

        let mut record = self.generate_form().into_record();
        if self.rng.gen_bool(thin_file_rate) {
            record.credit_score = None;
            record.num_credit_lines = None;
            record.has_co_signer = None;
        }

        ScoreRequest {
            application_id: format!("app_{:010}", self.application_counter),
            applicant: record,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_applicants=info".parse()?),
        )
        .init();

    info!("Starting Test Applicant Generator");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("credit.score");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let thin_file_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.1);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        thin_file_rate = thin_file_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, thin_file_rate, delay_ms).await;
        }
    };

    let mut generator = ApplicantGenerator::new();
    let mut approved = 0;
    let mut review = 0;
    let mut failed = 0;

    info!("Starting to send {} applications...", count);

    for i in 0..count {
        let request = generator.generate_request(thin_file_rate);
        let payload = serde_json::to_vec(&request)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => {
                if let Ok(result) = serde_json::from_slice::<CompositeResult>(&reply.payload) {
                    if result.risk_band.is_low_risk() {
                        approved += 1;
                    } else {
                        review += 1;
                    }
                    info!(
                        application_id = %request.application_id,
                        composite_score = result.composite_score,
                        risk_band = %result.risk_band,
                        "Scored"
                    );
                } else if let Ok(err) = serde_json::from_slice::<ErrorPayload>(&reply.payload) {
                    failed += 1;
                    warn!(
                        application_id = %request.application_id,
                        kind = %err.error.kind,
                        message = %err.error.message,
                        "Scoring failed"
                    );
                } else {
                    failed += 1;
                    warn!(application_id = %request.application_id, "Unrecognized reply");
                }
            }
            Err(e) => {
                failed += 1;
                warn!(application_id = %request.application_id, error = %e, "Request failed");
            }
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} applications ({} auto-approve, {} manual review, {} failed)",
                i + 1,
                count,
                approved,
                review,
                failed
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} applications ({} auto-approve, {} manual review, {} failed)",
        count, approved, review, failed
    );

    Ok(())
}

async fn run_dry_mode(count: u64, thin_file_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = ApplicantGenerator::new();

    for i in 0..count {
        let request = generator.generate_request(thin_file_rate);
        let json = serde_json::to_string_pretty(&request)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample application {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
