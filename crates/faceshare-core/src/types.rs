use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of facial landmarks produced by the detector.
pub const LANDMARK_COUNT: usize = 5;

/// Dimension of ArcFace embeddings.
pub const EMBEDDING_DIM: usize = 512;

/// Rounding slack for unit-norm vectors.
const UNIT_TOLERANCE: f32 = 1e-5;

/// A 2-D point in pixel coordinates.
pub type Point = (f32, f32);

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [Point; LANDMARK_COUNT];

/// Axis-aligned box in corner form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area using the inclusive-pixel convention: a box spanning 0..=10 covers 11 pixels.
    pub fn pixel_area(&self) -> f32 {
        (self.width() + 1.0).max(0.0) * (self.height() + 1.0).max(0.0)
    }

    /// Intersection-over-Union under the inclusive-pixel convention.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter_w = (x2 - x1 + 1.0).max(0.0);
        let inter_h = (y2 - y1 + 1.0).max(0.0);
        let inter_area = inter_w * inter_h;

        let union_area = self.pixel_area() + other.pixel_area() - inter_area;
        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Scale every coordinate by independent x/y ratios.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

/// A decoded detection before non-maximum suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceCandidate {
    pub bbox: BoundingBox,
    pub landmarks: Landmarks,
    pub confidence: f32,
}

/// A face that survived non-maximum suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Position within the kept set (0 = highest confidence).
    pub index: usize,
    pub bbox: BoundingBox,
    pub landmarks: Landmarks,
    pub confidence: f32,
}

impl DetectedFace {
    pub fn from_candidate(index: usize, candidate: FaceCandidate) -> Self {
        Self {
            index,
            bbox: candidate.bbox,
            landmarks: candidate.landmarks,
            confidence: candidate.confidence,
        }
    }

    /// Map from detector-input space to image space.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            index: self.index,
            bbox: self.bbox.scaled(sx, sy),
            landmarks: self.landmarks.map(|(x, y)| (x * sx, y * sy)),
            confidence: self.confidence,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("expected {expected}-dim embedding, got {actual}")]
    WrongDimension { expected: usize, actual: usize },
    #[error("embedding contains non-finite values")]
    NonFinite,
    #[error("embedding has zero norm")]
    ZeroNorm,
}

/// Unit-norm face embedding (512-dimensional for ArcFace).
///
/// Construction always L2-normalizes, so every `Embedding` in the system
/// satisfies ‖v‖₂ = 1 within floating tolerance. Serializes as a plain
/// list of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding {
    values: Box<[f32; EMBEDDING_DIM]>,
}

impl Embedding {
    /// Validate and L2-normalize a raw model output.
    pub fn from_raw(raw: Vec<f32>) -> Result<Self, EmbeddingError> {
        let mut values: Box<[f32; EMBEDDING_DIM]> =
            raw.into_boxed_slice()
                .try_into()
                .map_err(|rejected: Box<[f32]>| EmbeddingError::WrongDimension {
                    expected: EMBEDDING_DIM,
                    actual: rejected.len(),
                })?;

        if values.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::NonFinite);
        }
        let norm = l2_normalize(values.as_mut_slice());
        if norm <= f32::EPSILON {
            return Err(EmbeddingError::ZeroNorm);
        }

        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32; EMBEDDING_DIM] {
        &self.values
    }

    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Cosine similarity in [-1, 1]. Both sides are unit-norm, so this is a dot product.
    ///
    /// Results within normalization rounding of ±1 are reported as exactly ±1.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let dot = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum::<f64>() as f32;

        if dot >= 1.0 - UNIT_TOLERANCE {
            1.0
        } else if dot <= -1.0 + UNIT_TOLERANCE {
            -1.0
        } else {
            dot
        }
    }

    /// Distance as reported to callers: `1 - similarity`.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }

    /// The negated vector. Still unit-norm.
    pub fn negated(&self) -> Embedding {
        Self {
            values: Box::new(self.values.map(|v| -v)),
        }
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = EmbeddingError;

    fn try_from(raw: Vec<f32>) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.values.to_vec()
    }
}

/// Scale `values` to unit L2 norm in place, returning the norm before scaling.
///
/// A zero vector is left untouched.
pub fn l2_normalize(values: &mut [f32]) -> f32 {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
    norm
}

/// Outcome of comparing one detected face against a gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Identity of the selected gallery entry, `None` when nothing passed the threshold.
    pub identity: Option<String>,
    /// Similarity of the selected entry, or the best similarity seen when unmatched
    /// (0.0 for an empty gallery).
    pub similarity: f32,
    pub distance: f32,
}

impl MatchResult {
    pub fn no_match(best_similarity: f32) -> Self {
        Self {
            matched: false,
            identity: None,
            similarity: best_similarity,
            distance: 1.0 - best_similarity,
        }
    }
}

#[cfg(test)]
pub(crate) fn unit_embedding(axis: usize) -> Embedding {
    let mut raw = vec![0.0f32; EMBEDDING_DIM];
    raw[axis] = 1.0;
    Embedding::from_raw(raw).unwrap()
}
