//! Anchor center grids for the SCRFD feature pyramid.

use crate::types::Point;

/// Fixed detector geometry: input resolution, pyramid strides, anchors per cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorConfig {
    pub input_width: usize,
    pub input_height: usize,
    pub strides: Vec<usize>,
    pub anchors_per_location: usize,
}

impl AnchorConfig {
    /// SCRFD `det_10g`: 640×640 input, strides 8/16/32, two anchors per cell.
    pub fn scrfd() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            strides: vec![8, 16, 32],
            anchors_per_location: 2,
        }
    }
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self::scrfd()
    }
}

/// Anchor centers for one pyramid level.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorGrid {
    pub scale_index: usize,
    pub stride: usize,
    pub centers: Vec<Point>,
}

impl AnchorGrid {
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }
}

/// Generate one grid per stride.
///
/// Cells are visited y-major, x-minor; each cell center `(x * stride, y * stride)`
/// is emitted `anchors_per_location` times in a row, matching the order of the
/// detector's per-anchor output rows.
pub fn generate_anchors(config: &AnchorConfig) -> Vec<AnchorGrid> {
    config
        .strides
        .iter()
        .enumerate()
        .map(|(scale_index, &stride)| {
            let grid_h = config.input_height / stride;
            let grid_w = config.input_width / stride;
            let mut centers = Vec::with_capacity(grid_h * grid_w * config.anchors_per_location);

            for y in 0..grid_h {
                for x in 0..grid_w {
                    let center = ((x * stride) as f32, (y * stride) as f32);
                    for _ in 0..config.anchors_per_location {
                        centers.push(center);
                    }
                }
            }

            AnchorGrid {
                scale_index,
                stride,
                centers,
            }
        })
        .collect()
}
