//! SCRFD face detector.
//!
//! Runs the SCRFD (Sample and Computation Redistribution for Efficient Face
//! Detection) model on a stretched 640×640 input, decodes the three anchor
//! pyramid levels and applies NMS.

use crate::anchors::{generate_anchors, AnchorConfig, AnchorGrid};
use crate::decoder::{decode, StrideOutput, DEFAULT_DETECTION_THRESHOLD};
use crate::frame::Image;
use crate::model::{tensor_values, InferenceModel, ModelError, OrtModel};
use crate::nms::{suppress, DEFAULT_NMS_THRESHOLD};
use crate::types::DetectedFace;
use ndarray::{Array4, ArrayD};
use std::path::Path;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;

/// Per-request detection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Minimum anchor score kept by the decoder.
    pub detection_threshold: f32,
    /// IoU above which NMS suppresses a lower-scoring box.
    pub nms_threshold: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    model: Box<dyn InferenceModel>,
    config: AnchorConfig,
    grids: Vec<AnchorGrid>,
    /// Per-stride output indices, discovered by name at load time.
    stride_indices: Vec<StrideOutputIndices>,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, ModelError> {
        let model = OrtModel::load(model_path, intra_threads)?;
        Self::new(Box::new(model), AnchorConfig::scrfd())
    }

    /// Wrap an already-loaded model. Fails if it cannot produce one
    /// score/bbox/kps triple per configured stride.
    pub fn new(model: Box<dyn InferenceModel>, config: AnchorConfig) -> Result<Self, ModelError> {
        let needed = config.strides.len() * 3;
        let num_outputs = model.output_names().len();
        if num_outputs < needed {
            return Err(ModelError::InferenceFailed(format!(
                "SCRFD model requires {needed} outputs ({} strides × score/bbox/kps), got {num_outputs}",
                config.strides.len()
            )));
        }

        let stride_indices = discover_output_indices(model.output_names(), &config.strides);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        let grids = generate_anchors(&config);

        Ok(Self {
            model,
            config,
            grids,
            stride_indices,
        })
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Detect faces, returning them in NMS selection order (highest confidence first)
    /// with coordinates in `image` space.
    pub fn detect(
        &mut self,
        image: &Image,
        params: &DetectionParams,
    ) -> Result<Vec<DetectedFace>, ModelError> {
        let input = self.preprocess(image);
        let outputs = self.model.infer(input.view())?;

        let mut levels = Vec::with_capacity(self.grids.len());
        for (grid, &(score_idx, bbox_idx, kps_idx)) in self.grids.iter().zip(&self.stride_indices) {
            levels.push(StrideOutput::new(
                grid,
                output_values(&outputs, score_idx, "scores", grid.stride)?,
                output_values(&outputs, bbox_idx, "bboxes", grid.stride)?,
                output_values(&outputs, kps_idx, "kps", grid.stride)?,
            )?);
        }

        let candidates = decode(&self.grids, &levels, params.detection_threshold)?;
        let decoded = candidates.len();

        // Suppression runs in detector-input pixels so the kept set does not
        // depend on the source resolution.
        let kept = suppress(candidates, params.nms_threshold);

        // Back from the stretched detector input to image pixels.
        let scale_x = image.width() as f32 / self.config.input_width as f32;
        let scale_y = image.height() as f32 / self.config.input_height as f32;
        let faces: Vec<DetectedFace> = kept
            .iter()
            .map(|f| f.scaled(scale_x, scale_y))
            .collect();
        tracing::debug!(decoded, kept = faces.len(), "SCRFD detection complete");

        Ok(faces)
    }

    /// Resize to the detector input and normalize into an RGB NCHW tensor.
    fn preprocess(&self, image: &Image) -> Array4<f32> {
        let (w, h) = (self.config.input_width, self.config.input_height);
        let resized = image.resized(w as u32, h as u32);

        let mut tensor = Array4::<f32>::zeros((1, 3, h, w));
        for y in 0..h {
            for x in 0..w {
                let px = resized.rgb(x, y);
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (px[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
                }
            }
        }

        tensor
    }
}

fn output_values<'a>(
    outputs: &'a [ArrayD<f32>],
    idx: usize,
    what: &str,
    stride: usize,
) -> Result<&'a [f32], ModelError> {
    let tensor = outputs.get(idx).ok_or_else(|| {
        ModelError::InvalidOutput(format!("missing {what} output {idx} for stride {stride}"))
    })?;
    tensor_values(tensor, what)
}

/// Discover output tensor ordering by name.
///
/// SCRFD models may export tensors with named outputs ("score_8", "bbox_16", ...) or
/// generic numeric names. If the named pattern is complete, maps them to stride slots.
/// Otherwise falls back to the standard positional ordering for N strides:
///   [0, N)   = scores
///   [N, 2N)  = bboxes
///   [2N, 3N) = kps
fn discover_output_indices(names: &[String], strides: &[usize]) -> Vec<StrideOutputIndices> {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = strides
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(indices) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            indices
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping"
            );
            let n = strides.len();
            (0..n).map(|i| (i, n + i, 2 * n + i)).collect()
        }
    }
}
