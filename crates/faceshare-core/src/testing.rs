//! In-process stand-ins for ONNX models, used by unit tests.

use crate::anchors::AnchorConfig;
use crate::model::{InferenceModel, ModelError};
use ndarray::{ArrayD, ArrayView4, IxDyn};

/// Returns the same outputs on every call.
pub(crate) struct FixedModel {
    names: Vec<String>,
    outputs: Vec<ArrayD<f32>>,
}

impl FixedModel {
    pub(crate) fn new(outputs: Vec<ArrayD<f32>>) -> Self {
        let names = (0..outputs.len()).map(|i| i.to_string()).collect();
        Self { names, outputs }
    }

    pub(crate) fn single(shape: &[usize], data: Vec<f32>) -> Self {
        Self::new(vec![tensor(shape, data)])
    }
}

impl InferenceModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    fn output_names(&self) -> &[String] {
        &self.names
    }

    fn infer(&mut self, _input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, ModelError> {
        Ok(self.outputs.clone())
    }
}

/// Fails every call.
pub(crate) struct FailingModel {
    names: Vec<String>,
}

impl FailingModel {
    pub(crate) fn new(outputs: usize) -> Self {
        Self {
            names: (0..outputs).map(|i| i.to_string()).collect(),
        }
    }
}

impl InferenceModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    fn output_names(&self) -> &[String] {
        &self.names
    }

    fn infer(&mut self, _input: ArrayView4<'_, f32>) -> Result<Vec<ArrayD<f32>>, ModelError> {
        Err(ModelError::InferenceFailed("synthetic failure".into()))
    }
}

pub(crate) fn tensor(shape: &[usize], data: Vec<f32>) -> ArrayD<f32> {
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
}

/// One synthetic face planted on a single SCRFD anchor.
pub(crate) struct PlantedFace {
    pub stride: usize,
    pub cell_x: usize,
    pub cell_y: usize,
    pub score: f32,
    pub box_deltas: [f32; 4],
    pub landmark_deltas: [f32; 10],
}

/// SCRFD-shaped outputs (positional layout) with the given faces planted
/// on the first anchor of their cells and zero scores elsewhere.
pub(crate) fn scrfd_outputs(faces: &[PlantedFace]) -> Vec<ArrayD<f32>> {
    let config = AnchorConfig::scrfd();
    let mut scores = Vec::new();
    let mut boxes = Vec::new();
    let mut kps = Vec::new();

    for &stride in &config.strides {
        let grid_w = config.input_width / stride;
        let grid_h = config.input_height / stride;
        let n = grid_w * grid_h * config.anchors_per_location;

        let mut s = vec![0.0f32; n];
        let mut b = vec![0.0f32; n * 4];
        let mut k = vec![0.0f32; n * 10];

        for face in faces.iter().filter(|f| f.stride == stride) {
            let idx = (face.cell_y * grid_w + face.cell_x) * config.anchors_per_location;
            s[idx] = face.score;
            b[idx * 4..idx * 4 + 4].copy_from_slice(&face.box_deltas);
            k[idx * 10..idx * 10 + 10].copy_from_slice(&face.landmark_deltas);
        }

        scores.push(tensor(&[n, 1], s));
        boxes.push(tensor(&[n, 4], b));
        kps.push(tensor(&[n, 10], k));
    }

    scores.into_iter().chain(boxes).chain(kps).collect()
}

/// Landmark deltas (stride units) that form a plausible frontal face.
pub(crate) const FRONTAL_DELTAS: [f32; 10] = [
    -0.6, -0.4, // left eye
    0.6, -0.4, // right eye
    0.0, 0.1, // nose
    -0.5, 0.7, // left mouth
    0.5, 0.7, // right mouth
];
