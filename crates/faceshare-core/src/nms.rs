//! Greedy non-maximum suppression.

use crate::types::{DetectedFace, FaceCandidate};

/// Default IoU above which a lower-scoring candidate is suppressed.
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

/// Indices of the candidates kept by NMS, in selection order.
///
/// Candidates are ranked by confidence descending; equal scores keep their
/// original relative order. A candidate is dropped when its IoU with an
/// already-kept one is strictly above `iou_threshold`.
pub fn nms(candidates: &[FaceCandidate], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    // Stable sort: ties stay in original index order.
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .total_cmp(&candidates[a].confidence)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];

    for i in 0..order.len() {
        if suppressed[i] {
            continue;
        }
        let kept = &candidates[order[i]].bbox;
        keep.push(order[i]);

        for j in (i + 1)..order.len() {
            if suppressed[j] {
                continue;
            }
            if kept.iou(&candidates[order[j]].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Run NMS and number the survivors.
pub fn suppress(candidates: Vec<FaceCandidate>, iou_threshold: f32) -> Vec<DetectedFace> {
    let keep = nms(&candidates, iou_threshold);
    let mut slots: Vec<Option<FaceCandidate>> = candidates.into_iter().map(Some).collect();

    keep.into_iter()
        .enumerate()
        .filter_map(|(index, idx)| {
            slots[idx]
                .take()
                .map(|c| DetectedFace::from_candidate(index, c))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn cand(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> FaceCandidate {
        FaceCandidate {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            landmarks: [(0.0, 0.0); 5],
            confidence: conf,
        }
    }

    #[test]
    fn test_nms_suppresses_contained_box() {
        // IoU = 100 / 121 ≈ 0.83 under the inclusive-pixel convention.
        let cands = vec![
            cand(0.0, 0.0, 10.0, 10.0, 0.9),
            cand(1.0, 1.0, 10.0, 10.0, 0.8),
        ];
        assert_eq!(nms(&cands, 0.4), vec![0]);
    }

    #[test]
    fn test_nms_keeps_when_below_threshold() {
        let cands = vec![
            cand(0.0, 0.0, 10.0, 10.0, 0.9),
            cand(1.0, 1.0, 10.0, 10.0, 0.8),
        ];
        assert_eq!(nms(&cands, 0.9), vec![0, 1]);
    }

    #[test]
    fn test_nms_selection_order() {
        let cands = vec![
            cand(200.0, 200.0, 250.0, 250.0, 0.7),
            cand(0.0, 0.0, 100.0, 100.0, 0.8),
            cand(5.0, 5.0, 105.0, 105.0, 0.95),
        ];
        assert_eq!(nms(&cands, 0.4), vec![2, 0]);
    }

    #[test]
    fn test_nms_ties_broken_by_index() {
        let cands = vec![
            cand(0.0, 0.0, 10.0, 10.0, 0.5),
            cand(100.0, 100.0, 110.0, 110.0, 0.5),
            cand(0.0, 0.0, 10.0, 10.0, 0.5),
        ];
        assert_eq!(nms(&cands, 0.4), vec![0, 1]);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(&[], 0.4).is_empty());
    }

    #[test]
    fn test_kept_boxes_never_overlap_above_threshold() {
        let mut cands = Vec::new();
        for i in 0..40 {
            let off = (i * 7 % 60) as f32;
            cands.push(cand(off, off / 2.0, off + 40.0, off / 2.0 + 40.0, (i % 13) as f32 / 13.0));
        }
        let keep = nms(&cands, 0.4);
        for (n, &a) in keep.iter().enumerate() {
            for &b in &keep[n + 1..] {
                assert!(cands[a].bbox.iou(&cands[b].bbox) <= 0.4);
            }
        }
    }

    #[test]
    fn test_suppress_numbers_faces() {
        let faces = suppress(
            vec![
                cand(0.0, 0.0, 10.0, 10.0, 0.6),
                cand(50.0, 50.0, 60.0, 60.0, 0.9),
            ],
            0.4,
        );
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].index, 0);
        assert_eq!(faces[0].confidence, 0.9);
        assert_eq!(faces[1].index, 1);
        assert_eq!(faces[1].confidence, 0.6);
    }
}
