//! Anchor-relative decoding of raw SCRFD outputs into face candidates.

use crate::anchors::AnchorGrid;
use crate::model::ModelError;
use crate::types::{BoundingBox, FaceCandidate, Landmarks, LANDMARK_COUNT};

/// Default minimum score for a decoded anchor.
pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.3;

/// Raw detector output for one pyramid level, one row per anchor.
///
/// Lengths are checked against the anchor grid at construction, so decoding
/// never indexes out of bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct StrideOutput {
    scores: Vec<f32>,
    /// [left, top, right, bottom] distances in stride units.
    box_deltas: Vec<[f32; 4]>,
    /// (dx, dy) per landmark in stride units.
    landmark_deltas: Vec<[f32; LANDMARK_COUNT * 2]>,
}

impl StrideOutput {
    pub fn new(
        grid: &AnchorGrid,
        scores: &[f32],
        box_deltas: &[f32],
        landmark_deltas: &[f32],
    ) -> Result<Self, ModelError> {
        let anchors = grid.len();
        let check = |what: &str, per_anchor: usize, actual: usize| {
            if actual != anchors * per_anchor {
                Err(ModelError::ShapeMismatch {
                    what: format!("{what} stride {}", grid.stride),
                    expected: anchors * per_anchor,
                    actual,
                })
            } else {
                Ok(())
            }
        };
        check("scores", 1, scores.len())?;
        check("bboxes", 4, box_deltas.len())?;
        check("kps", LANDMARK_COUNT * 2, landmark_deltas.len())?;

        Ok(Self {
            scores: scores.to_vec(),
            box_deltas: box_deltas
                .chunks_exact(4)
                .map(|c| std::array::from_fn(|i| c[i]))
                .collect(),
            landmark_deltas: landmark_deltas
                .chunks_exact(LANDMARK_COUNT * 2)
                .map(|c| std::array::from_fn(|i| c[i]))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Decode every anchor scoring at least `threshold` across all pyramid levels.
///
/// Coordinates are in detector-input pixels. Levels with no passing anchors
/// contribute nothing; an empty result is not an error.
pub fn decode(
    grids: &[AnchorGrid],
    outputs: &[StrideOutput],
    threshold: f32,
) -> Result<Vec<FaceCandidate>, ModelError> {
    if grids.len() != outputs.len() {
        return Err(ModelError::ShapeMismatch {
            what: "pyramid levels".into(),
            expected: grids.len(),
            actual: outputs.len(),
        });
    }

    let mut candidates = Vec::new();

    for (grid, output) in grids.iter().zip(outputs) {
        if grid.len() != output.len() {
            return Err(ModelError::ShapeMismatch {
                what: format!("anchors stride {}", grid.stride),
                expected: grid.len(),
                actual: output.len(),
            });
        }

        let stride = grid.stride as f32;
        let before = candidates.len();

        for (idx, &score) in output.scores.iter().enumerate() {
            if score < threshold {
                continue;
            }
            let (ax, ay) = grid.centers[idx];
            let d = output.box_deltas[idx];
            let bbox = BoundingBox::new(
                ax - d[0] * stride,
                ay - d[1] * stride,
                ax + d[2] * stride,
                ay + d[3] * stride,
            );

            let k = &output.landmark_deltas[idx];
            let landmarks: Landmarks =
                std::array::from_fn(|i| (ax + k[i * 2] * stride, ay + k[i * 2 + 1] * stride));

            candidates.push(FaceCandidate {
                bbox,
                landmarks,
                confidence: score,
            });
        }

        tracing::trace!(
            stride = grid.stride,
            kept = candidates.len() - before,
            "decoded pyramid level"
        );
    }

    Ok(candidates)
}
