// src/inference.rs

//! ONNX Runtime backend for the residual regressor.
//!
//! The trained forest is exported to ONNX (a `TreeEnsembleRegressor` graph)
//! with a single float input of shape `[batch, n_features]` and a single
//! `[batch, 1]` output. ONNX graphs do not carry column names, so the
//! expected feature order comes from the profile's `rf_features` list or,
//! failing that, from a `feature_names` JSON array in the model metadata.

use crate::error::{P1204Error, Result};
use crate::residual::ResidualModel;
use log::{debug, info};
use ndarray::Array2;
use ort::session::{Session, builder::GraphOptimizationLevel};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Model metadata key holding the input column names as a JSON array.
pub const FEATURE_NAMES_METADATA_KEY: &str = "feature_names";

pub struct OnnxResidualModel {
    path: PathBuf,
    feature_names: Vec<String>,
    // `Session::run` needs exclusive access
    session: Mutex<Session>,
}

impl fmt::Debug for OnnxResidualModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxResidualModel")
            .field("path", &self.path)
            .field("features", &self.feature_names.len())
            .finish()
    }
}

impl OnnxResidualModel {
    /// Loads the model. `configured` overrides the names stored in the model.
    pub fn load(path: &Path, configured: Option<&[String]>) -> Result<Self> {
        info!("Loading residual model: {}", path.display());
        let load_error = |reason: String| P1204Error::ModelLoad {
            path: path.display().to_string(),
            reason,
        };
        if !path.is_file() {
            return Err(load_error("file not found".to_string()));
        }

        let session = Session::builder()
            .map_err(|e| load_error(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_error(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| load_error(format!("Failed to load model: {}", e)))?;

        if session.inputs.len() != 1 || session.outputs.len() != 1 {
            return Err(load_error(format!(
                "expected one input and one output, model has {} and {}",
                session.inputs.len(),
                session.outputs.len()
            )));
        }

        let stored = session
            .metadata()
            .and_then(|metadata| metadata.custom(FEATURE_NAMES_METADATA_KEY))
            .map_err(|e| load_error(format!("Failed to read model metadata: {}", e)))?;
        let feature_names = resolve_feature_names(configured, stored.as_deref()).map_err(load_error)?;

        info!(
            "Residual model loaded: input '{}' over {} features",
            session.inputs[0].name,
            feature_names.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            feature_names,
            session: Mutex::new(session),
        })
    }
}

/// Picks the input column names: the configured list first, then the JSON
/// array stored in the model metadata.
fn resolve_feature_names(
    configured: Option<&[String]>,
    stored: Option<&str>,
) -> std::result::Result<Vec<String>, String> {
    if let Some(names) = configured {
        if names.is_empty() {
            return Err("configured feature list is empty".to_string());
        }
        return Ok(names.to_vec());
    }
    let stored = stored.ok_or_else(|| {
        format!(
            "no feature names: set 'rf_features' in the profile or '{}' in the model metadata",
            FEATURE_NAMES_METADATA_KEY
        )
    })?;
    let names: Vec<String> = serde_json::from_str(stored)
        .map_err(|e| format!("metadata '{}' is not a JSON string array: {}", FEATURE_NAMES_METADATA_KEY, e))?;
    if names.is_empty() {
        return Err(format!("metadata '{}' is empty", FEATURE_NAMES_METADATA_KEY));
    }
    Ok(names)
}

/// The regressor output for a single row.
fn single_value(values: &[f32]) -> Result<f64> {
    match values {
        [value] if value.is_finite() => Ok(f64::from(*value)),
        [value] => Err(P1204Error::Inference(format!("model returned {}", value))),
        _ => Err(P1204Error::Inference(format!(
            "expected a single output value, got {}",
            values.len()
        ))),
    }
}

impl ResidualModel for OnnxResidualModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.feature_names.len() {
            return Err(P1204Error::Inference(format!(
                "expected {} features, got {}",
                self.feature_names.len(),
                features.len()
            )));
        }
        // tree ensembles compare in single precision
        let row: Vec<f32> = features.iter().map(|&v| v as f32).collect();
        let array = Array2::from_shape_vec((1, row.len()), row)
            .map_err(|e| P1204Error::Inference(format!("Failed to shape input: {}", e)))?;
        let input = ort::value::Tensor::from_array(array)
            .map_err(|e| P1204Error::Inference(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| P1204Error::Inference("Failed to acquire session lock".to_string()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| P1204Error::Inference(format!("Residual inference failed: {}", e)))?;
        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| P1204Error::Inference(format!("Failed to extract output tensor: {}", e)))?;
        let values: Vec<f32> = output.iter().copied().collect();
        let residual = single_value(&values)?;
        debug!("Residual model output: {:.4}", residual);
        Ok(residual)
    }
}
