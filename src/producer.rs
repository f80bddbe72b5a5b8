//! NATS publisher for replies and decision events

use crate::error::{ErrorPayload, ScoringError};
use crate::types::result::DecisionEvent;
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::debug;

/// Publisher for request replies and decision events
#[derive(Clone)]
pub struct ResponsePublisher {
    client: Client,
    decision_subject: String,
}

impl ResponsePublisher {
    pub fn new(client: Client, decision_subject: &str) -> Self {
        Self {
            client,
            decision_subject: decision_subject.to_string(),
        }
    }

    /// Reply to a request with any serializable body
    pub async fn reply<T: Serialize>(&self, reply_to: Subject, body: &T) -> Result<()> {
        let payload = serde_json::to_vec(body)?;
        self.client.publish(reply_to, payload.into()).await?;
        Ok(())
    }

    /// Reply with a structured error payload
    pub async fn reply_error(&self, reply_to: Subject, error: &ScoringError) -> Result<()> {
        self.reply(reply_to, &ErrorPayload::from(error)).await
    }

    /// Publish a decision event
    pub async fn publish_decision(&self, event: &DecisionEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(self.decision_subject.clone(), payload.into())
            .await?;

        debug!(
            event_id = %event.event_id,
            application_id = %event.application_id,
            risk_band = %event.risk_band,
            "Published decision event"
        );

        Ok(())
    }

    pub fn decision_subject(&self) -> &str {
        &self.decision_subject
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
