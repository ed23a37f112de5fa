//! The `FaceEngine` capability and the full detect → align → embed → match pipeline.

use crate::alignment::{align_face, AlignmentError};
use crate::detector::{DetectionParams, FaceDetector};
use crate::frame::Image;
use crate::gallery::Gallery;
use crate::matcher::{CosineMatcher, Matcher};
use crate::model::ModelError;
use crate::recognizer::FaceRecognizer;
use crate::types::{DetectedFace, Embedding, MatchResult};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTION_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNITION_MODEL_FILE: &str = "w600k_r50.onnx";

/// Failure that aborts a whole request.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("detection failed: {0}")]
    ModelInference(#[from] ModelError),
}

impl PipelineError {
    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::ModelInference(_) => "model_inference",
        }
    }
}

impl From<crate::frame::ImageError> for PipelineError {
    fn from(err: crate::frame::ImageError) -> Self {
        PipelineError::InvalidInput(err.to_string())
    }
}

/// Failure scoped to one detected face; other faces are unaffected.
#[derive(Error, Debug)]
pub enum FaceError {
    #[error("alignment failed: {0}")]
    Alignment(#[from] AlignmentError),
    #[error("embedding failed: {0}")]
    ModelInference(#[from] ModelError),
}

impl FaceError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            FaceError::Alignment(_) => "alignment",
            FaceError::ModelInference(_) => "model_inference",
        }
    }
}

/// What an engine reports about itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub engine: &'static str,
    pub detection_model: String,
    pub recognition_model: String,
    /// True when detections and embeddings are fabricated rather than computed.
    pub synthetic: bool,
}

/// One detected face with its embedding (or the reason it has none) and,
/// after [`recognize`], its gallery match.
#[derive(Debug)]
pub struct FaceAnalysis {
    pub face: DetectedFace,
    pub embedding: Result<Embedding, FaceError>,
    pub match_result: Option<MatchResult>,
}

/// Per-image pipeline output.
#[derive(Debug)]
pub struct Analysis {
    pub image_width: u32,
    pub image_height: u32,
    /// In detection order (highest confidence first).
    pub faces: Vec<FaceAnalysis>,
}

impl Analysis {
    pub fn embedded_count(&self) -> usize {
        self.faces.iter().filter(|f| f.embedding.is_ok()).count()
    }

    pub fn matched(&self) -> impl Iterator<Item = (&DetectedFace, &MatchResult)> {
        self.faces.iter().filter_map(|f| {
            f.match_result
                .as_ref()
                .filter(|m| m.matched)
                .map(|m| (&f.face, m))
        })
    }
}

/// A face detection + recognition backend.
///
/// Implementations own their model handles and are driven from a single
/// thread at a time; concurrent callers go through a worker that serializes
/// access.
pub trait FaceEngine: Send {
    fn status(&self) -> EngineStatus;

    /// Detect faces in image coordinates. An image with no faces yields an empty list.
    fn detect(
        &mut self,
        image: &Image,
        params: &DetectionParams,
    ) -> Result<Vec<DetectedFace>, PipelineError>;

    /// Compute the unit-norm embedding of one detected face.
    fn embed(&mut self, image: &Image, face: &DetectedFace) -> Result<Embedding, FaceError>;

    /// Detect every face and embed each one independently.
    ///
    /// A failing face is reported in place; the remaining faces still run.
    fn analyze(&mut self, image: &Image, params: &DetectionParams) -> Result<Analysis, PipelineError> {
        let detected = self.detect(image, params)?;
        let mut faces = Vec::with_capacity(detected.len());

        for face in detected {
            let embedding = self.embed(image, &face);
            if let Err(err) = &embedding {
                tracing::warn!(
                    face = face.index,
                    reason = err.reason_code(),
                    error = %err,
                    "face skipped"
                );
            }
            faces.push(FaceAnalysis {
                face,
                embedding,
                match_result: None,
            });
        }

        tracing::info!(
            faces = faces.len(),
            embedded = faces.iter().filter(|f| f.embedding.is_ok()).count(),
            "image analyzed"
        );

        Ok(Analysis {
            image_width: image.width(),
            image_height: image.height(),
            faces,
        })
    }
}

/// Analyze `image` and match every embedded face against `gallery`.
///
/// Each face is matched independently, so two faces may resolve to the same
/// identity. An empty gallery yields "no match" for every face.
pub fn recognize(
    engine: &mut dyn FaceEngine,
    image: &Image,
    params: &DetectionParams,
    gallery: &Gallery,
    threshold: f32,
) -> Result<Analysis, PipelineError> {
    let mut analysis = engine.analyze(image, params)?;
    let matcher = CosineMatcher;

    for face in &mut analysis.faces {
        if let Ok(embedding) = &face.embedding {
            let result = matcher.best_match(embedding, gallery, threshold);
            if let Some(identity) = &result.identity {
                tracing::info!(
                    face = face.face.index,
                    identity = %identity,
                    similarity = result.similarity,
                    "face recognized"
                );
            }
            face.match_result = Some(result);
        }
    }

    tracing::info!(
        gallery = gallery.len(),
        matched = analysis.matched().count(),
        "recognition complete"
    );

    Ok(analysis)
}

/// Engine backed by SCRFD detection and ArcFace recognition models.
pub struct OnnxEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEngine {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path, intra_threads: usize) -> Result<Self, ModelError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTION_MODEL_FILE), intra_threads)?;
        tracing::info!(model = detector.model_name(), "SCRFD detector loaded");

        let recognizer =
            FaceRecognizer::load(&model_dir.join(RECOGNITION_MODEL_FILE), intra_threads)?;
        tracing::info!(model = recognizer.model_name(), "ArcFace recognizer loaded");

        Ok(Self::new(detector, recognizer))
    }

    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self {
            detector,
            recognizer,
        }
    }
}

impl FaceEngine for OnnxEngine {
    fn status(&self) -> EngineStatus {
        EngineStatus {
            engine: "onnx",
            detection_model: format!("SCRFD ({})", self.detector.model_name()),
            recognition_model: format!("ArcFace ({})", self.recognizer.model_name()),
            synthetic: false,
        }
    }

    fn detect(
        &mut self,
        image: &Image,
        params: &DetectionParams,
    ) -> Result<Vec<DetectedFace>, PipelineError> {
        Ok(self.detector.detect(image, params)?)
    }

    fn embed(&mut self, image: &Image, face: &DetectedFace) -> Result<Embedding, FaceError> {
        let aligned = align_face(image, &face.landmarks)?;
        Ok(self.recognizer.embed(&aligned)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::AnchorConfig;
    use crate::frame::ChannelOrder;
    use crate::testing::{scrfd_outputs, FailingModel, FixedModel, PlantedFace, FRONTAL_DELTAS};
    use crate::types::{unit_embedding, EMBEDDING_DIM};

    fn image() -> Image {
        Image::new(vec![120; 640 * 640 * 3], 640, 640, ChannelOrder::Rgb).unwrap()
    }

    fn good_face() -> PlantedFace {
        PlantedFace {
            stride: 32,
            cell_x: 5,
            cell_y: 5,
            score: 0.9,
            box_deltas: [2.0; 4],
            landmark_deltas: FRONTAL_DELTAS,
        }
    }

    fn degenerate_face() -> PlantedFace {
        // All five landmarks collapse onto the anchor center.
        PlantedFace {
            stride: 32,
            cell_x: 15,
            cell_y: 15,
            score: 0.8,
            box_deltas: [2.0; 4],
            landmark_deltas: [0.0; 10],
        }
    }

    fn engine(faces: &[PlantedFace], recognizer: Box<dyn crate::model::InferenceModel>) -> OnnxEngine {
        let detector = FaceDetector::new(
            Box::new(FixedModel::new(scrfd_outputs(faces))),
            AnchorConfig::scrfd(),
        )
        .unwrap();
        OnnxEngine::new(detector, FaceRecognizer::new(recognizer))
    }

    fn axis0_model() -> Box<FixedModel> {
        let mut raw = vec![0.0f32; EMBEDDING_DIM];
        raw[0] = 5.0;
        Box::new(FixedModel::single(&[1, EMBEDDING_DIM], raw))
    }

    #[test]
    fn test_partial_failure_isolated_per_face() {
        let mut engine = engine(&[good_face(), degenerate_face()], axis0_model());
        let analysis = engine.analyze(&image(), &DetectionParams::default()).unwrap();

        assert_eq!(analysis.faces.len(), 2);
        assert_eq!(analysis.embedded_count(), 1);

        let first = &analysis.faces[0];
        assert!((first.face.confidence - 0.9).abs() < 1e-6);
        assert_eq!(first.embedding.as_ref().unwrap(), &unit_embedding(0));

        let second = &analysis.faces[1];
        assert!((second.face.confidence - 0.8).abs() < 1e-6);
        let err = second.embedding.as_ref().unwrap_err();
        assert!(matches!(err, FaceError::Alignment(AlignmentError::Coincident { .. })));
        assert_eq!(err.reason_code(), "alignment");
    }

    #[test]
    fn test_embedding_failure_isolated_per_face() {
        let mut engine = engine(&[good_face()], Box::new(FailingModel::new(1)));
        let analysis = engine.analyze(&image(), &DetectionParams::default()).unwrap();
        assert_eq!(analysis.faces.len(), 1);
        assert!(matches!(
            analysis.faces[0].embedding,
            Err(FaceError::ModelInference(_))
        ));
    }

    #[test]
    fn test_no_faces_is_not_an_error() {
        let mut engine = engine(&[], axis0_model());
        let analysis = engine.analyze(&image(), &DetectionParams::default()).unwrap();
        assert!(analysis.faces.is_empty());
    }

    #[test]
    fn test_detector_failure_fails_request() {
        let detector =
            FaceDetector::new(Box::new(FailingModel::new(9)), AnchorConfig::scrfd()).unwrap();
        let mut engine = OnnxEngine::new(detector, FaceRecognizer::new(axis0_model()));
        let err = engine
            .analyze(&image(), &DetectionParams::default())
            .unwrap_err();
        assert_eq!(err.reason_code(), "model_inference");
    }

    #[test]
    fn test_recognize_matches_each_face() {
        let mut engine = engine(&[good_face(), degenerate_face()], axis0_model());
        let mut gallery = Gallery::default();
        gallery.push("stranger", unit_embedding(1));
        gallery.push("alice", unit_embedding(0));

        let analysis =
            recognize(&mut engine, &image(), &DetectionParams::default(), &gallery, 0.4).unwrap();

        let m = analysis.faces[0].match_result.as_ref().unwrap();
        assert!(m.matched);
        assert_eq!(m.identity.as_deref(), Some("alice"));
        // The face without an embedding gets no match result.
        assert!(analysis.faces[1].match_result.is_none());
        assert_eq!(analysis.matched().count(), 1);
    }

    #[test]
    fn test_recognize_empty_gallery() {
        let mut engine = engine(&[good_face()], axis0_model());
        let analysis = recognize(
            &mut engine,
            &image(),
            &DetectionParams::default(),
            &Gallery::default(),
            0.4,
        )
        .unwrap();
        let m = analysis.faces[0].match_result.as_ref().unwrap();
        assert!(!m.matched);
        assert_eq!(m.identity, None);
    }

    #[test]
    fn test_status_names_models() {
        let engine = engine(&[], axis0_model());
        let status = engine.status();
        assert_eq!(status.engine, "onnx");
        assert!(!status.synthetic);
        assert!(status.detection_model.contains("fixed"));
    }

    #[test]
    fn test_load_missing_models() {
        let err = OnnxEngine::load(Path::new("/nonexistent/models"), 1).err().unwrap();
        assert!(matches!(err, ModelError::ModelNotFound(_)));
    }

    #[test]
    fn test_invalid_image_reason_code() {
        let err: PipelineError = Image::new(vec![], 0, 0, ChannelOrder::Rgb).unwrap_err().into();
        assert_eq!(err.reason_code(), "invalid_input");
    }
}
