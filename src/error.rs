//! Error types for the scoring pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single field that failed boundary validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while loading artifacts or scoring a request.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// A model, explainer or schema artifact is missing or corrupt.
    /// Fatal at startup: the service must not accept traffic.
    #[error("failed to load {artifact} from {}: {reason}", path.display())]
    StartupLoad {
        artifact: String,
        path: PathBuf,
        reason: String,
    },

    /// The model raised during prediction or explanation.
    #[error("{model} inference failed: {reason}")]
    Inference { model: String, reason: String },

    /// The applicant record failed boundary validation.
    #[error("invalid applicant record: {}", summarize(violations))]
    InvalidRecord { violations: Vec<FieldViolation> },

    /// The request payload could not be decoded.
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{} ({})", v.field, v.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ScoringError {
    pub fn startup_load(
        artifact: impl Into<String>,
        path: impl AsRef<Path>,
        reason: impl ToString,
    ) -> Self {
        Self::StartupLoad {
            artifact: artifact.into(),
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::Inference {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable tag used in structured error replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartupLoad { .. } => "startup_load_failure",
            Self::Inference { .. } => "inference_failure",
            Self::InvalidRecord { .. } => "invalid_record",
            Self::MalformedRequest(_) => "malformed_request",
        }
    }
}

/// Structured error reply returned at the request boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

impl From<&ScoringError> for ErrorPayload {
    fn from(err: &ScoringError) -> Self {
        let violations = match err {
            ScoringError::InvalidRecord { violations } => violations.clone(),
            _ => Vec::new(),
        };

        Self {
            error: ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
                violations,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(
            ScoringError::startup_load("repayment model", "models/a.onnx", "missing").kind(),
            "startup_load_failure"
        );
        assert_eq!(
            ScoringError::inference("income", "bad shape").kind(),
            "inference_failure"
        );
        assert_eq!(
            ScoringError::MalformedRequest("eof".to_string()).kind(),
            "malformed_request"
        );
    }

    #[test]
    fn test_error_payload_carries_violations() {
        let err = ScoringError::InvalidRecord {
            violations: vec![FieldViolation::new("Age", "out of range")],
        };

        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.error.kind, "invalid_record");
        assert_eq!(payload.error.violations.len(), 1);
        assert!(payload.error.message.contains("Age (out of range)"));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["error"]["kind"], "invalid_record");
    }

    #[test]
    fn test_inference_payload_omits_empty_violations() {
        let err = ScoringError::inference("repayment", "shape mismatch");
        let json = serde_json::to_value(ErrorPayload::from(&err)).unwrap();
        assert!(json["error"].get("violations").is_none());
        assert_eq!(json["error"]["message"], "repayment inference failed: shape mismatch");
    }
}
