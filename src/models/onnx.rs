//! ONNX Runtime backed models

use crate::error::ScoringError;
use crate::feature_encoder::EncodedFeatureVector;
use crate::models::{BinaryClassifier, Regressor};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Loaded ONNX model with its resolved input/output names.
pub struct OnnxModel {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxModel {
    /// Load a model from file. `output_hint` picks the output to read
    /// (e.g. "prob" for classifiers).
    pub fn load<P: AsRef<Path>>(
        path: P,
        name: &str,
        threads: usize,
        output_hint: &str,
    ) -> Result<Self, ScoringError> {
        let path = path.as_ref();
        let load_err = |e: ort::Error| ScoringError::startup_load(format!("{} model", name), path, e);

        info!(model = %name, path = %path.display(), threads = threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(threads)
            .map_err(load_err)?
            .commit_from_file(path)
            .map_err(load_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains(output_hint))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| ScoringError::startup_load(format!("{} model", name), path, "graph has no outputs"))?;

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the graph on a `[1, n]` input and return the selected output as f32 values.
    fn run(&self, features: &EncodedFeatureVector) -> Result<Vec<f32>, ScoringError> {
        let err = |e: ort::Error| ScoringError::inference(&self.name, e);

        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_f32())).map_err(err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ScoringError::inference(&self.name, format!("lock poisoned: {}", e)))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(err)?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ScoringError::inference(&self.name, format!("missing output '{}'", self.output_name))
        })?;

        if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            return Ok(data.to_vec());
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output);
        }

        Err(ScoringError::inference(
            &self.name,
            format!("unsupported output type for '{}'", self.output_name),
        ))
    }

    /// Class probabilities from a seq(map(int64, float)) output, as
    /// exported by zipmap-style classifier converters.
    fn extract_from_sequence_map(&self, output: &DynValue) -> Result<Vec<f32>, ScoringError> {
        let err = |e: ort::Error| ScoringError::inference(&self.name, e);
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(err)?;
        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .map_err(err)?;
        let first = maps
            .first()
            .ok_or_else(|| ScoringError::inference(&self.name, "empty probability sequence"))?;

        let mut pairs = first.try_extract_key_values::<i64, f32>().map_err(err)?;
        pairs.sort_by_key(|(class, _)| *class);

        debug!(model = %self.name, classes = pairs.len(), "Extracted from seq(map)");
        Ok(pairs.into_iter().map(|(_, p)| p).collect())
    }
}

/// Reads `[p0, p1]` from a probability output; a single value is taken as
/// the positive-class probability.
fn binary_probabilities(data: &[f32]) -> Option<[f64; 2]> {
    match data {
        [positive] => Some([1.0 - *positive as f64, *positive as f64]),
        [negative, positive, ..] => Some([*negative as f64, *positive as f64]),
        [] => None,
    }
}

impl BinaryClassifier for OnnxModel {
    fn predict_proba(&self, features: &EncodedFeatureVector) -> Result<[f64; 2], ScoringError> {
        let data = self.run(features)?;
        binary_probabilities(&data)
            .ok_or_else(|| ScoringError::inference(&self.name, "empty probability output"))
    }
}

impl Regressor for OnnxModel {
    fn predict(&self, features: &EncodedFeatureVector) -> Result<f64, ScoringError> {
        let data = self.run(features)?;
        data.first()
            .map(|&v| v as f64)
            .ok_or_else(|| ScoringError::inference(&self.name, "empty regression output"))
    }
}
