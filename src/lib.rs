//! Beneficiary Credit Scoring Library
//!
//! Composite creditworthiness scoring for applicants without a traditional
//! credit history: a repayment model and an income proxy model, blended into
//! one score and risk band, with per-feature explanations for both.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_encoder;
pub mod income_verification;
pub mod intake;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod types;

pub use config::AppConfig;
pub use consumer::{Operation, RequestConsumer, ScoreRequest};
pub use error::ScoringError;
pub use feature_encoder::SchemaAligner;
pub use intake::ApplicationForm;
pub use models::inference::CreditScorer;
pub use producer::ResponsePublisher;
pub use types::{ApplicantRecord, CompositeResult, ExplanationPayload, RiskBand};
