//! faceshare-core: face detection, alignment, recognition and matching.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference. Faces are aligned to
//! the canonical 112×112 ArcFace crop before embedding, and embeddings are
//! matched by cosine similarity against a caller-supplied gallery.

pub mod alignment;
pub mod anchors;
pub mod decoder;
pub mod detector;
pub mod engine;
pub mod frame;
pub mod gallery;
pub mod matcher;
pub mod mock;
pub mod model;
pub mod nms;
pub mod recognizer;
pub mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

pub use alignment::{align_face, AlignedFace, AlignmentError, SimilarityTransform};
pub use detector::{DetectionParams, FaceDetector};
pub use engine::{
    recognize, Analysis, EngineStatus, FaceAnalysis, FaceEngine, FaceError, OnnxEngine, PipelineError,
};
pub use frame::{ChannelOrder, Image, ImageError};
pub use gallery::{Gallery, GalleryEntry, GalleryError};
pub use matcher::{compare, Comparison, CosineMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use mock::MockEngine;
pub use model::{InferenceModel, ModelError, OrtModel};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, DetectedFace, Embedding, EmbeddingError, Landmarks, MatchResult, Point, EMBEDDING_DIM,
};

/// Default model directory: `$XDG_DATA_HOME/faceshare/models`, falling back
/// to `$HOME/.local/share/faceshare/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceshare/models")
}
