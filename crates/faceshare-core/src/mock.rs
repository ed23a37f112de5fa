//! Synthetic engine for exercising the pipeline without model files.
//!
//! Every image yields exactly one centered face whose embedding is a
//! deterministic function of the pixel buffer. Nothing here is a real
//! detection; [`EngineStatus::synthetic`] is always set.

use crate::detector::DetectionParams;
use crate::engine::{EngineStatus, FaceEngine, FaceError, PipelineError};
use crate::frame::Image;
use crate::model::ModelError;
use crate::types::{BoundingBox, DetectedFace, Embedding, EmbeddingError, Landmarks, EMBEDDING_DIM};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Confidence reported for the synthetic face.
pub const MOCK_CONFIDENCE: f32 = 0.95;

/// Landmark offsets from the image center, in pixels.
const LANDMARK_OFFSETS: [(f32, f32); 5] = [
    (-30.0, -20.0),
    (30.0, -20.0),
    (0.0, 0.0),
    (-25.0, 30.0),
    (25.0, 30.0),
];

#[derive(Debug, Default)]
pub struct MockEngine;

impl MockEngine {
    pub fn new() -> Self {
        tracing::warn!("mock face engine active: detections and embeddings are synthetic");
        Self
    }
}

impl FaceEngine for MockEngine {
    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: "mock",
            detection_model: "none".into(),
            recognition_model: "none".into(),
            synthetic: true,
        }
    }

    fn detect(
        &mut self,
        image: &Image,
        params: &DetectionParams,
    ) -> Result<Vec<DetectedFace>, PipelineError> {
        if MOCK_CONFIDENCE < params.detection_threshold {
            return Ok(Vec::new());
        }
        Ok(vec![centered_face(image.width(), image.height())])
    }

    fn embed(&mut self, image: &Image, _face: &DetectedFace) -> Result<Embedding, FaceError> {
        seeded_embedding(image_seed(image))
            .map_err(|err| ModelError::InvalidOutput(format!("mock embedding: {err}")).into())
    }
}

/// One face covering the middle third of the image in each axis.
fn centered_face(width: u32, height: u32) -> DetectedFace {
    let (cx, cy) = ((width / 2) as f32, (height / 2) as f32);
    let (half_w, half_h) = ((width / 3 / 2) as f32, (height / 3 / 2) as f32);

    let landmarks: Landmarks = LANDMARK_OFFSETS.map(|(dx, dy)| (cx + dx, cy + dy));

    DetectedFace {
        index: 0,
        bbox: BoundingBox::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h),
        landmarks,
        confidence: MOCK_CONFIDENCE,
    }
}

/// Seed derived from the image dimensions and pixels.
fn image_seed(image: &Image) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.data());
    let digest = hasher.finalize();

    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

/// Unit vector drawn from a standard normal distribution (Box–Muller).
fn seeded_embedding(seed: u64) -> Result<Embedding, EmbeddingError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(EMBEDDING_DIM);

    while values.len() < EMBEDDING_DIM {
        // 1 - [0, 1) keeps the log argument strictly positive.
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        values.push((r * theta.cos()) as f32);
        values.push((r * theta.sin()) as f32);
    }

    Embedding::from_raw(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::recognize;
    use crate::frame::ChannelOrder;
    use crate::gallery::Gallery;

    fn image(fill: u8) -> Image {
        Image::new(vec![fill; 300 * 200 * 3], 300, 200, ChannelOrder::Rgb).unwrap()
    }

    #[test]
    fn test_detects_one_centered_face() {
        let faces = MockEngine
            .detect(&image(10), &DetectionParams::default())
            .unwrap();
        assert_eq!(faces.len(), 1);

        let face = &faces[0];
        assert_eq!(face.confidence, MOCK_CONFIDENCE);
        assert_eq!(face.bbox, BoundingBox::new(100.0, 67.0, 200.0, 133.0));
        assert_eq!(face.landmarks[0], (120.0, 80.0));
        assert_eq!(face.landmarks[2], (150.0, 100.0));
        assert_eq!(face.landmarks[4], (175.0, 130.0));
    }

    #[test]
    fn test_honors_detection_threshold() {
        let params = DetectionParams {
            detection_threshold: 0.99,
            ..DetectionParams::default()
        };
        assert!(MockEngine.detect(&image(10), &params).unwrap().is_empty());
    }

    #[test]
    fn test_embedding_deterministic_per_image() {
        let mut engine = MockEngine;
        let a = engine.analyze(&image(10), &DetectionParams::default()).unwrap();
        let b = engine.analyze(&image(10), &DetectionParams::default()).unwrap();
        let c = engine.analyze(&image(11), &DetectionParams::default()).unwrap();

        let ea = a.faces[0].embedding.as_ref().unwrap();
        let eb = b.faces[0].embedding.as_ref().unwrap();
        let ec = c.faces[0].embedding.as_ref().unwrap();
        assert_eq!(ea, eb);
        assert_ne!(ea, ec);
        assert!((ea.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_seeded_embedding_is_spread_out() {
        let e = seeded_embedding(7).unwrap();
        let max = e.values().iter().fold(0.0f32, |m, v| m.max(v.abs()));
        // A normal draw spreads mass across dimensions.
        assert!(max < 0.3);
        assert_eq!(e, seeded_embedding(7).unwrap());
    }

    #[test]
    fn test_same_image_recognized_against_itself() {
        let mut engine = MockEngine;
        let query = image(42);
        let mut gallery = Gallery::default();
        gallery.push("other", seeded_embedding(1).unwrap());
        gallery.push("self", seeded_embedding(image_seed(&query)).unwrap());

        let analysis =
            recognize(&mut engine, &query, &DetectionParams::default(), &gallery, 0.9).unwrap();
        let m = analysis.faces[0].match_result.as_ref().unwrap();
        assert_eq!(m.identity.as_deref(), Some("self"));
    }

    #[test]
    fn test_status_is_synthetic() {
        assert!(MockEngine.status().synthetic);
    }
}
