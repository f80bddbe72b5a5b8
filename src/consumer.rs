//! NATS request consumer for score and explanation requests

use crate::error::ScoringError;
use crate::types::applicant::ApplicantRecord;
use anyhow::Result;
use async_nats::{Client, Message};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Operation requested by an incoming message, from the subject it arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Score,
    Explain,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Score => "score",
            Operation::Explain => "explain",
        }
    }
}

/// Request envelope: the applicant record plus an optional correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    #[serde(default = "new_application_id")]
    pub application_id: String,
    #[serde(flatten)]
    pub applicant: ApplicantRecord,
}

fn new_application_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl ScoreRequest {
    pub fn new(applicant: ApplicantRecord) -> Self {
        Self {
            application_id: new_application_id(),
            applicant,
        }
    }

    /// Decode a request payload. Unknown categorical labels and mistyped
    /// values are malformed requests.
    pub fn decode(payload: &[u8]) -> Result<Self, ScoringError> {
        serde_json::from_slice(payload).map_err(|e| ScoringError::MalformedRequest(e.to_string()))
    }
}

/// Consumer for receiving scoring requests from NATS
pub struct RequestConsumer {
    client: Client,
    score_subject: String,
    explain_subject: String,
}

impl RequestConsumer {
    pub fn new(client: Client, score_subject: &str, explain_subject: &str) -> Self {
        Self {
            client,
            score_subject: score_subject.to_string(),
            explain_subject: explain_subject.to_string(),
        }
    }

    /// Subscribe to both request subjects, merged into one stream tagged
    /// with the requested operation
    pub async fn subscribe(&self) -> Result<BoxStream<'static, (Operation, Message)>> {
        let scores = self.client.subscribe(self.score_subject.clone()).await?;
        info!(subject = %self.score_subject, "Subscribed to score subject");

        let explains = self.client.subscribe(self.explain_subject.clone()).await?;
        info!(subject = %self.explain_subject, "Subscribed to explain subject");

        Ok(stream::select(
            scores.map(|message| (Operation::Score, message)),
            explains.map(|message| (Operation::Explain, message)),
        )
        .boxed())
    }

    pub fn score_subject(&self) -> &str {
        &self.score_subject
    }

    pub fn explain_subject(&self) -> &str {
        &self.explain_subject
    }
}
