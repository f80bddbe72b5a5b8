//! Type definitions for the scoring pipeline

pub mod applicant;
pub mod result;

pub use applicant::{ApplicantRecord, MissingFieldPolicy};
pub use result::{CompositeResult, Decision, DecisionEvent, ExplanationPayload, RiskBand};
