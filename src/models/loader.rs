//! Artifact loader: models, explainers and feature schemas.
//!
//! Loading is all-or-nothing. Any missing or corrupt artifact aborts startup
//! so the service never scores with a partial model set.

use crate::config::{ArtifactConfig, ModelBackend, ModelsConfig};
use crate::error::ScoringError;
use crate::feature_encoder::{FeatureSchema, SchemaAligner};
use crate::models::onnx::OnnxModel;
use crate::models::tree_ensemble::{Objective, TreeEnsemble, TreeModel};
use crate::models::{BinaryClassifier, IncomeModel, ModelContext, Regressor, RepaymentModel};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Loader for scoring artifacts
pub struct ArtifactLoader {
    backend: ModelBackend,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ArtifactLoader {
    pub fn new(backend: ModelBackend, onnx_threads: usize) -> Result<Self, ScoringError> {
        if backend == ModelBackend::Onnx {
            ort::init()
                .commit()
                .map_err(|e| ScoringError::startup_load("ONNX Runtime", PathBuf::new(), e))?;
            info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        }
        Ok(Self {
            backend,
            onnx_threads,
        })
    }

    pub fn from_config(config: &ModelsConfig) -> Result<Self, ScoringError> {
        Self::new(config.backend, config.onnx_threads)
    }

    /// Load a feature schema (JSON array of column names).
    pub fn load_schema<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<FeatureSchema, ScoringError> {
        let path = path.as_ref();
        let artifact = format!("{} feature schema", name);

        let raw = fs::read_to_string(path).map_err(|e| ScoringError::startup_load(&artifact, path, e))?;
        let schema: FeatureSchema =
            serde_json::from_str(&raw).map_err(|e| ScoringError::startup_load(&artifact, path, e))?;

        if schema.is_empty() {
            return Err(ScoringError::startup_load(&artifact, path, "schema has no columns"));
        }

        info!(model = %name, columns = schema.len(), "Feature schema loaded");
        Ok(schema)
    }

    /// Load a tree ensemble and check it against the schema width.
    pub fn load_tree_ensemble<P: AsRef<Path>>(
        &self,
        path: P,
        artifact: &str,
        name: &str,
        schema: &FeatureSchema,
    ) -> Result<TreeModel, ScoringError> {
        let path = path.as_ref();

        let raw = fs::read_to_string(path).map_err(|e| ScoringError::startup_load(artifact, path, e))?;
        let ensemble =
            TreeEnsemble::from_json(&raw).map_err(|e| ScoringError::startup_load(artifact, path, e))?;

        if ensemble.num_features != schema.len() {
            return Err(ScoringError::startup_load(
                artifact,
                path,
                format!(
                    "ensemble expects {} features but the schema has {} columns",
                    ensemble.num_features,
                    schema.len()
                ),
            ));
        }

        info!(
            artifact = %artifact,
            trees = ensemble.trees.len(),
            objective = ?ensemble.objective,
            "Tree ensemble loaded"
        );

        Ok(TreeModel::new(name, ensemble))
    }

    fn load_tree_with_objective(
        &self,
        path: &Path,
        artifact: &str,
        name: &str,
        schema: &FeatureSchema,
        objective: Objective,
    ) -> Result<TreeModel, ScoringError> {
        let model = self.load_tree_ensemble(path, artifact, name, schema)?;
        if model.ensemble().objective != objective {
            return Err(ScoringError::startup_load(
                artifact,
                path,
                format!("expected objective {:?}, found {:?}", objective, model.ensemble().objective),
            ));
        }
        Ok(model)
    }

    fn load_classifier(
        &self,
        path: &Path,
        schema: &FeatureSchema,
    ) -> Result<Box<dyn BinaryClassifier>, ScoringError> {
        Ok(match self.backend {
            ModelBackend::Onnx => Box::new(OnnxModel::load(path, "repayment", self.onnx_threads, "prob")?),
            ModelBackend::Tree => Box::new(self.load_tree_with_objective(
                path,
                "repayment model",
                "repayment",
                schema,
                Objective::BinaryLogistic,
            )?),
        })
    }

    fn load_regressor(
        &self,
        path: &Path,
        schema: &FeatureSchema,
    ) -> Result<Box<dyn Regressor>, ScoringError> {
        Ok(match self.backend {
            ModelBackend::Onnx => Box::new(OnnxModel::load(path, "income", self.onnx_threads, "variable")?),
            ModelBackend::Tree => Box::new(self.load_tree_with_objective(
                path,
                "income model",
                "income",
                schema,
                Objective::SquaredError,
            )?),
        })
    }

    /// Load all six artifacts from `models_dir`.
    pub fn load_context<P: AsRef<Path>>(
        &self,
        models_dir: P,
        repayment: &ArtifactConfig,
        income: &ArtifactConfig,
    ) -> Result<ModelContext, ScoringError> {
        let dir = models_dir.as_ref();

        let repayment_schema = self.load_schema(dir.join(&repayment.features), "repayment")?;
        let repayment_model = self.load_classifier(&dir.join(&repayment.model), &repayment_schema)?;
        let repayment_explainer = self.load_tree_with_objective(
            &dir.join(&repayment.explainer),
            "repayment explainer",
            "repayment",
            &repayment_schema,
            Objective::BinaryLogistic,
        )?;

        let income_schema = self.load_schema(dir.join(&income.features), "income")?;
        let income_model = self.load_regressor(&dir.join(&income.model), &income_schema)?;
        let income_explainer = self.load_tree_with_objective(
            &dir.join(&income.explainer),
            "income explainer",
            "income",
            &income_schema,
            Objective::SquaredError,
        )?;

        info!(
            backend = ?self.backend,
            models_dir = %dir.display(),
            "All scoring artifacts loaded"
        );

        Ok(ModelContext {
            repayment: RepaymentModel {
                model: repayment_model,
                explainer: Box::new(repayment_explainer),
                encoder: SchemaAligner::repayment(repayment_schema),
            },
            income: IncomeModel {
                model: income_model,
                explainer: Box::new(income_explainer),
                encoder: SchemaAligner::income(income_schema),
            },
        })
    }

    /// Load the context described by the models section of the configuration.
    pub fn load_configured(&self, config: &ModelsConfig) -> Result<ModelContext, ScoringError> {
        self.load_context(&config.models_dir, &config.repayment, &config.income)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    const STUMP: &str = r#"{"objective": "reg:squarederror", "num_features": 2, "trees": [
        {"nodes": [{"feature": 0, "threshold": 1.0, "left": 1, "right": 2, "cover": 4.0},
                   {"leaf": 1.0, "cover": 2.0}, {"leaf": 2.0, "cover": 2.0}]}]}"#;

    #[test]
    fn test_load_schema() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "features.json", r#"["Age", "Income"]"#);

        let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
        let schema = loader.load_schema(dir.path().join("features.json"), "income").unwrap();
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_empty_or_missing_schema_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "empty.json", "[]");
        write(dir.path(), "corrupt.json", "{not json");

        let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
        for name in ["empty.json", "corrupt.json", "absent.json"] {
            let err = loader.load_schema(dir.path().join(name), "income").unwrap_err();
            assert_eq!(err.kind(), "startup_load_failure", "{}", name);
        }
    }

    #[test]
    fn test_tree_width_must_match_schema() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "model.json", STUMP);

        let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
        let schema = FeatureSchema::new(["Age", "Income", "LoanAmount"]);
        let err = loader
            .load_tree_ensemble(dir.path().join("model.json"), "income model", "income", &schema)
            .unwrap_err();
        assert!(err.to_string().contains("expects 2 features"));
    }

    #[test]
    fn test_objective_must_match_role() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "model.json", STUMP);

        let loader = ArtifactLoader::new(ModelBackend::Tree, 1).unwrap();
        let schema = FeatureSchema::new(["Age", "Income"]);
        let err = loader
            .load_tree_with_objective(
                &dir.path().join("model.json"),
                "repayment model",
                "repayment",
                &schema,
                Objective::BinaryLogistic,
            )
            .unwrap_err();
        assert!(err.to_string().contains("expected objective BinaryLogistic"));
    }
}
