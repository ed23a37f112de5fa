//! ArcFace face recognizer.
//!
//! Extracts 512-dimensional face embeddings from aligned face crops,
//! using the w600k_r50 ArcFace model.

use crate::alignment::{AlignedFace, ALIGNED_SIZE};
use crate::model::{tensor_values, InferenceModel, ModelError, OrtModel};
use crate::types::Embedding;
use ndarray::Array4;
use std::path::Path;

// Symmetric normalization to [-1, 1]; SCRFD divides by 128 instead.
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    model: Box<dyn InferenceModel>,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ModelError> {
        let model = OrtModel::load(model_path, intra_threads)?;
        Ok(Self::new(Box::new(model)))
    }

    pub fn new(model: Box<dyn InferenceModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Run the model on an aligned crop and return the unit-norm embedding.
    ///
    /// Any model failure, an output of the wrong size, or a degenerate
    /// (zero / non-finite) output is a [`ModelError`]; nothing is retried.
    pub fn embed(&mut self, face: &AlignedFace) -> Result<Embedding, ModelError> {
        let input = Self::preprocess(face);
        let outputs = self.model.infer(input.view())?;

        let first = outputs
            .first()
            .ok_or_else(|| ModelError::InvalidOutput("recognizer returned no outputs".into()))?;
        let raw = tensor_values(first, "embedding")?.to_vec();

        Embedding::from_raw(raw).map_err(|e| ModelError::InvalidOutput(e.to_string()))
    }

    /// Preprocess an aligned RGB crop into a NCHW float tensor.
    fn preprocess(face: &AlignedFace) -> Array4<f32> {
        let size = ALIGNED_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size.min(face.size) {
            for x in 0..size.min(face.size) {
                let px = face.rgb(x, y);
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (px[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
                }
            }
        }

        tensor
    }
}
