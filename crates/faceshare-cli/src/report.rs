//! JSON shapes printed by the CLI.

use crate::worker::WorkerError;
use faceshare_core::{
    Analysis, BoundingBox, Embedding, FaceAnalysis, FaceError, Landmarks, MatchResult,
    PipelineError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub reason: &'static str,
    pub message: String,
}

impl From<&PipelineError> for ErrorReport {
    fn from(err: &PipelineError) -> Self {
        Self {
            reason: err.reason_code(),
            message: err.to_string(),
        }
    }
}

impl From<&FaceError> for ErrorReport {
    fn from(err: &FaceError) -> Self {
        Self {
            reason: err.reason_code(),
            message: err.to_string(),
        }
    }
}

impl From<&WorkerError> for ErrorReport {
    fn from(err: &WorkerError) -> Self {
        match err {
            WorkerError::Pipeline(inner) => inner.into(),
            other => Self {
                reason: "engine_unavailable",
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FaceReport {
    pub index: usize,
    pub bbox: BoundingBox,
    pub landmarks: Landmarks,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_result: Option<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl FaceReport {
    fn new(face: &FaceAnalysis, include_embedding: bool) -> Self {
        let (embedding, error) = match &face.embedding {
            Ok(embedding) => (include_embedding.then(|| embedding.clone()), None),
            Err(err) => (None, Some(err.into())),
        };
        Self {
            index: face.face.index,
            bbox: face.face.bbox,
            landmarks: face.face.landmarks,
            confidence: face.face.confidence,
            embedding,
            match_result: face.match_result.clone(),
            error,
        }
    }
}

/// Full per-image result for `detect` and `match`.
#[derive(Debug, Serialize)]
pub struct ImageReport {
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub faces_detected: usize,
    pub faces_embedded: usize,
    pub faces: Vec<FaceReport>,
}

impl ImageReport {
    pub fn new(image: String, analysis: &Analysis, include_embeddings: bool) -> Self {
        Self {
            image,
            width: analysis.image_width,
            height: analysis.image_height,
            faces_detected: analysis.faces.len(),
            faces_embedded: analysis.embedded_count(),
            faces: analysis
                .faces
                .iter()
                .map(|f| FaceReport::new(f, include_embeddings))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagMatch {
    pub face: usize,
    pub identity: String,
    pub similarity: f32,
}

/// Compact per-image result for `tag`: who is in the photo.
#[derive(Debug, Serialize)]
pub struct TagReport {
    pub image: String,
    pub total_detected: usize,
    pub total_matched: usize,
    pub matches: Vec<TagMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl TagReport {
    pub fn new(image: String, analysis: &Analysis) -> Self {
        let matches: Vec<TagMatch> = analysis
            .matched()
            .filter_map(|(face, m)| {
                Some(TagMatch {
                    face: face.index,
                    identity: m.identity.clone()?,
                    similarity: m.similarity,
                })
            })
            .collect();
        Self {
            image,
            total_detected: analysis.faces.len(),
            total_matched: matches.len(),
            matches,
            error: None,
        }
    }

    pub fn failed(image: String, err: &WorkerError) -> Self {
        Self {
            image,
            total_detected: 0,
            total_matched: 0,
            matches: Vec::new(),
            error: Some(err.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EmbeddingMatch {
    /// Position of the embedding in the input file.
    pub index: usize,
    pub identity: String,
    pub similarity: f32,
}

/// Result of `match-embeddings`.
#[derive(Debug, Serialize)]
pub struct EmbeddingMatchReport {
    pub total_detected: usize,
    pub total_matched: usize,
    pub matches: Vec<EmbeddingMatch>,
}

impl EmbeddingMatchReport {
    pub fn new(total_detected: usize, matches: Vec<EmbeddingMatch>) -> Self {
        Self {
            total_detected,
            total_matched: matches.len(),
            matches,
        }
    }
}

/// Precomputed embeddings: a list of vectors or `{"detected_encodings": [...]}`.
///
/// Entries stay raw JSON so one bad vector does not reject the whole file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EncodingsFile {
    List(Vec<Value>),
    Wrapped { detected_encodings: Vec<Value> },
}

impl EncodingsFile {
    pub fn into_values(self) -> Vec<Value> {
        match self {
            EncodingsFile::List(v) | EncodingsFile::Wrapped { detected_encodings: v } => v,
        }
    }
}

/// An embedding file: a bare list of numbers or `{"embedding": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingFile {
    Bare(Embedding),
    Wrapped { embedding: Embedding },
}

impl EmbeddingFile {
    pub fn into_embedding(self) -> Embedding {
        match self {
            EmbeddingFile::Bare(e) | EmbeddingFile::Wrapped { embedding: e } => e,
        }
    }
}
