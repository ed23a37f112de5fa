//! Narrow inference boundary around ONNX Runtime sessions.
//!
//! Detection and recognition code only sees [`InferenceModel`], so decoding,
//! alignment and matching never depend on `ort` types.

use ndarray::{ArrayD, ArrayView4, IxDyn};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0} (download from insightface and place in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("shape mismatch for {what}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid model output: {0}")]
    InvalidOutput(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A loaded model mapping one NCHW float tensor to a list of output tensors.
pub trait InferenceModel: Send {
    /// Short model name for logs and status reports.
    fn name(&self) -> &str;

    /// Output tensor names, in output order.
    fn output_names(&self) -> &[String];

    fn infer(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, ModelError>;
}

/// [`InferenceModel`] backed by an ONNX Runtime CPU session.
pub struct OrtModel {
    session: Session,
    name: String,
    output_names: Vec<String>,
}

impl OrtModel {
    /// Load an ONNX model from `model_path`.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(
                model_path.to_string_lossy().into_owned(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded ONNX model"
        );

        Ok(Self {
            session,
            name,
            output_names,
        })
    }
}

impl InferenceModel for OrtModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }

    fn infer(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, ModelError> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut tensors = Vec::with_capacity(self.output_names.len());
        for (idx, name) in self.output_names.iter().enumerate() {
            let (shape, data) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ModelError::InferenceFailed(format!("output {name}: {e}")))?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            let tensor = ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
                .map_err(|e| ModelError::InvalidOutput(format!("output {name}: {e}")))?;
            tensors.push(tensor);
        }

        Ok(tensors)
    }
}

/// Contiguous view of an output tensor's values in logical order.
pub(crate) fn tensor_values<'a>(
    tensor: &'a ArrayD<f32>,
    what: &str,
) -> Result<&'a [f32], ModelError> {
    tensor
        .as_slice()
        .ok_or_else(|| ModelError::InvalidOutput(format!("{what}: non-contiguous tensor")))
}
