//! Configuration management for the scoring service

use crate::types::applicant::MissingFieldPolicy;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Backend that executes the predictive models
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// ONNX graphs run through ONNX Runtime
    #[default]
    Onnx,
    /// JSON tree ensembles evaluated in-process
    Tree,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for score requests
    pub score_subject: String,
    /// Subject for explanation requests
    pub explain_subject: String,
    /// Subject decision events are published to
    pub decision_subject: String,
}

/// File names of one model's artifacts, relative to `models_dir`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArtifactConfig {
    pub model: String,
    pub explainer: String,
    pub features: String,
}

impl ArtifactConfig {
    fn named(prefix: &str, model_extension: &str) -> Self {
        Self {
            model: format!("{}_model.{}", prefix, model_extension),
            explainer: format!("{}_model_explainer.json", prefix),
            features: format!("{}_model_features.json", prefix),
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing all artifacts
    pub models_dir: String,
    #[serde(default)]
    pub backend: ModelBackend,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    #[serde(default = "default_repayment_artifacts")]
    pub repayment: ArtifactConfig,
    #[serde(default = "default_income_artifacts")]
    pub income: ArtifactConfig,
}

fn default_onnx_threads() -> usize {
    1
}

fn default_repayment_artifacts() -> ArtifactConfig {
    ArtifactConfig::named("repayment", "onnx")
}

fn default_income_artifacts() -> ArtifactConfig {
    ArtifactConfig::named("income", "onnx")
}

/// Request-level scoring behavior
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringConfig {
    /// How absent applicant fields are treated
    #[serde(default)]
    pub missing_fields: MissingFieldPolicy,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                score_subject: "credit.score".to_string(),
                explain_subject: "credit.explain".to_string(),
                decision_subject: "credit.decisions".to_string(),
            },
            models: ModelsConfig {
                models_dir: "saved_models".to_string(),
                backend: ModelBackend::Onnx,
                onnx_threads: 1,
                repayment: default_repayment_artifacts(),
                income: default_income_artifacts(),
            },
            scoring: ScoringConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}
