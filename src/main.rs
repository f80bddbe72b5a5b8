//! Credit Scoring Service - Main Entry Point
//!
//! Answers score and explanation requests over NATS request/reply and
//! publishes a decision event for every scored application.

use anyhow::{Context, Result};
use beneficiary_credit_scoring::{
    config::{AppConfig, LoggingConfig},
    consumer::{Operation, RequestConsumer, ScoreRequest},
    metrics::{MetricsReporter, ScoringMetrics},
    models::inference::CreditScorer,
    producer::ResponsePublisher,
    types::DecisionEvent,
    ScoringError,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("beneficiary_credit_scoring={}", logging.level))
    })?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.pretty().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path as the first argument
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load()?,
    };

    init_logging(&config.logging)?;
    info!("Starting Credit Scoring Service");
    info!(
        models_dir = %config.models.models_dir,
        backend = ?config.models.backend,
        "Configuration loaded successfully"
    );

    // Every artifact must load before the service accepts requests
    let scorer = match CreditScorer::from_config(&config) {
        Ok(scorer) => Arc::new(scorer),
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Failed to load scoring artifacts");
            return Err(e.into());
        }
    };

    let metrics = Arc::new(ScoringMetrics::new());

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.score_subject,
        &config.nats.explain_subject,
    );
    let publisher = Arc::new(ResponsePublisher::new(
        client.clone(),
        &config.nats.decision_subject,
    ));

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        score_subject = %consumer.score_subject(),
        explain_subject = %consumer.explain_subject(),
        decision_subject = %publisher.decision_subject(),
        "Starting request processing loop"
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut requests = consumer.subscribe().await?;

    while let Some((operation, message)) = requests.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let scorer = scorer.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let Some(reply_to) = message.reply.clone() else {
                warn!(
                    subject = %message.subject,
                    operation = operation.as_str(),
                    "Request without reply subject dropped"
                );
                drop(permit);
                return;
            };

            let outcome = match ScoreRequest::decode(&message.payload) {
                Ok(request) => match operation {
                    Operation::Score => scorer.score(&request.applicant).map(|result| {
                        metrics.record_score(start_time.elapsed(), &result);
                        (request.application_id, Reply::Score(result))
                    }),
                    Operation::Explain => scorer.explain(&request.applicant).map(|payload| {
                        metrics.record_explanation(start_time.elapsed());
                        (request.application_id, Reply::Explain(Box::new(payload)))
                    }),
                },
                Err(e) => Err(e),
            };

            match outcome {
                Ok((application_id, Reply::Score(result))) => {
                    if let Err(e) = publisher.reply(reply_to, &result).await {
                        error!(application_id = %application_id, error = %e, "Failed to send score reply");
                    }

                    let event = DecisionEvent::new(&application_id, &result);
                    if let Err(e) = publisher.publish_decision(&event).await {
                        error!(application_id = %application_id, error = %e, "Failed to publish decision event");
                    }

                    debug!(
                        application_id = %application_id,
                        composite_score = result.composite_score,
                        risk_band = %result.risk_band,
                        processing_time_us = start_time.elapsed().as_micros(),
                        "Application scored"
                    );
                }
                Ok((application_id, Reply::Explain(payload))) => {
                    if let Err(e) = publisher.reply(reply_to, payload.as_ref()).await {
                        error!(application_id = %application_id, error = %e, "Failed to send explanation reply");
                    }
                    debug!(
                        application_id = %application_id,
                        processing_time_us = start_time.elapsed().as_micros(),
                        "Application explained"
                    );
                }
                Err(e) => {
                    metrics.record_failure(e.kind());
                    log_failure(operation, &e);
                    if let Err(publish_err) = publisher.reply_error(reply_to, &e).await {
                        error!(error = %publish_err, "Failed to send error reply");
                    }
                }
            }

            let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let latency = metrics.score_latency();
                info!(
                    handled = count,
                    throughput = format!("{:.1} req/s", metrics.get_throughput()),
                    avg_score_latency_us = latency.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

enum Reply {
    Score(beneficiary_credit_scoring::CompositeResult),
    Explain(Box<beneficiary_credit_scoring::ExplanationPayload>),
}

/// Client-side problems are warnings; model failures are errors.
fn log_failure(operation: Operation, err: &ScoringError) {
    match err {
        ScoringError::InvalidRecord { .. } | ScoringError::MalformedRequest(_) => {
            warn!(operation = operation.as_str(), kind = err.kind(), error = %err, "Request rejected");
        }
        _ => {
            error!(operation = operation.as_str(), kind = err.kind(), error = %err, "Request failed");
        }
    }
}
