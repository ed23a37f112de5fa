//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical 112×112 position using the five
//! InsightFace reference landmarks and least-squares estimation.

use crate::frame::{Image, CHANNELS};
use crate::types::{Landmarks, Point, LANDMARK_COUNT};
use thiserror::Error;

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS_112: Landmarks = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: usize = 112;

/// Minimum mean squared spread (px²) of the source landmarks.
const MIN_SPREAD: f32 = 1e-3;
/// Minimum ratio of the minor to major principal variance of the source landmarks.
const MIN_ANISOTROPY: f32 = 1e-3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("landmarks contain non-finite coordinates")]
    NonFinite,
    #[error("landmarks are coincident (spread {spread:.3e} px²)")]
    Coincident { spread: f32 },
    #[error("landmarks are collinear (variance ratio {ratio:.3e})")]
    Collinear { ratio: f32 },
    #[error("similarity transform is singular (scale {scale:.3e})")]
    Singular { scale: f32 },
}

/// Similarity transform
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
/// i.e. uniform scale `sqrt(a² + b²)`, rotation `atan2(b, a)`, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    pub const IDENTITY: SimilarityTransform = SimilarityTransform {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Least-squares similarity transform mapping `src` onto `dst`.
    ///
    /// Closed-form solution on centered point sets. Fails when the source
    /// points do not span two dimensions, since the rotation is then
    /// undetermined.
    pub fn estimate(src: &Landmarks, dst: &Landmarks) -> Result<Self, AlignmentError> {
        if src
            .iter()
            .chain(dst.iter())
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(AlignmentError::NonFinite);
        }

        let n = LANDMARK_COUNT as f32;
        let (src_mx, src_my) = centroid(src);
        let (dst_mx, dst_my) = centroid(dst);

        let mut sxx = 0.0f32;
        let mut syy = 0.0f32;
        let mut sxy = 0.0f32;
        let mut num_a = 0.0f32;
        let mut num_b = 0.0f32;

        for i in 0..LANDMARK_COUNT {
            let (sx, sy) = (src[i].0 - src_mx, src[i].1 - src_my);
            let (dx, dy) = (dst[i].0 - dst_mx, dst[i].1 - dst_my);
            sxx += sx * sx;
            syy += sy * sy;
            sxy += sx * sy;
            num_a += sx * dx + sy * dy;
            num_b += sx * dy - sy * dx;
        }

        let spread = (sxx + syy) / n;
        if spread < MIN_SPREAD {
            return Err(AlignmentError::Coincident { spread });
        }

        // Principal variances of the source cloud.
        let half_trace = (sxx + syy) / 2.0;
        let disc = (((sxx - syy) / 2.0).powi(2) + sxy * sxy).sqrt();
        let major = half_trace + disc;
        let minor = (half_trace - disc).max(0.0);
        let ratio = minor / major;
        if ratio < MIN_ANISOTROPY {
            return Err(AlignmentError::Collinear { ratio });
        }

        let var = sxx + syy;
        let a = num_a / var;
        let b = num_b / var;

        let scale = (a * a + b * b).sqrt();
        if !scale.is_finite() || scale < 1e-6 {
            return Err(AlignmentError::Singular { scale });
        }

        Ok(Self {
            a,
            b,
            tx: dst_mx - (a * src_mx - b * src_my),
            ty: dst_my - (b * src_mx + a * src_my),
        })
    }

    pub fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    /// Rotation in radians.
    pub fn rotation(&self) -> f32 {
        self.b.atan2(self.a)
    }

    pub fn apply(&self, (x, y): Point) -> Point {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Row-major 2×3 affine matrix.
    pub fn to_matrix(&self) -> [f32; 6] {
        [self.a, -self.b, self.tx, self.b, self.a, self.ty]
    }
}

fn centroid(points: &Landmarks) -> Point {
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Canonical-size RGB face crop, ready for the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFace {
    /// Interleaved RGB, `size * size * 3` bytes.
    pub data: Vec<u8>,
    pub size: usize,
}

impl AlignedFace {
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let off = (y * self.size + x) * CHANNELS;
        [self.data[off], self.data[off + 1], self.data[off + 2]]
    }
}

/// Warp `image` through `transform` into a `size × size` RGB patch.
///
/// Uses bilinear interpolation. Out-of-bounds pixels are filled with 0 (black).
pub fn warp_affine(
    image: &Image,
    transform: &SimilarityTransform,
    size: usize,
) -> Result<AlignedFace, AlignmentError> {
    let SimilarityTransform { a, b, tx, ty } = *transform;

    // Invert the 2x2 part: M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return Err(AlignmentError::Singular { scale: det.sqrt() });
    }
    let inv_det = 1.0 / det;
    let ia = a * inv_det;
    let ib = b * inv_det;

    let src_width = image.width() as i32;
    let src_height = image.height() as i32;
    let mut output = vec![0u8; size * size * CHANNELS];

    for oy in 0..size {
        for ox in 0..size {
            // Map output pixel back to source: src = M_inv * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let sample = |x: i32, y: i32| -> [f32; 3] {
                if x >= 0 && x < src_width && y >= 0 && y < src_height {
                    image.rgb(x as usize, y as usize).map(f32::from)
                } else {
                    [0.0; 3]
                }
            };

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            for c in 0..CHANNELS {
                let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                    + tr[c] * fx * (1.0 - fy)
                    + bl[c] * (1.0 - fx) * fy
                    + br[c] * fx * fy;
                output[(oy * size + ox) * CHANNELS + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    Ok(AlignedFace { data: output, size })
}

/// Align a detected face to a canonical 112×112 RGB crop.
pub fn align_face(image: &Image, landmarks: &Landmarks) -> Result<AlignedFace, AlignmentError> {
    let transform = SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS_112)?;
    tracing::trace!(
        scale = transform.scale(),
        rotation = transform.rotation(),
        "estimated alignment transform"
    );
    warp_affine(image, &transform, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;

    fn patterned(width: u32, height: u32) -> Image {
        let mut data = Vec::with_capacity((width * height) as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 7 + y * 3) as u8);
                data.push((x * 13 ^ y * 5) as u8);
                data.push((x + y * 11) as u8);
            }
        }
        Image::new(data, width, height, ChannelOrder::Rgb).unwrap()
    }

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = SimilarityTransform::estimate(&pts, &pts).unwrap();
        assert!((m.a - 1.0).abs() < 1e-5, "a = {}", m.a);
        assert!(m.b.abs() < 1e-5, "b = {}", m.b);
        assert!(m.tx.abs() < 1e-3, "tx = {}", m.tx);
        assert!(m.ty.abs() < 1e-3, "ty = {}", m.ty);
    }

    #[test]
    fn test_identity_patch_equals_crop() {
        let image = patterned(160, 130);
        let aligned = align_face(&image, &REFERENCE_LANDMARKS_112).unwrap();
        assert_eq!(aligned.size, ALIGNED_SIZE);
        for y in 0..ALIGNED_SIZE {
            for x in 0..ALIGNED_SIZE {
                assert_eq!(aligned.rgb(x, y), image.rgb(x, y), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → transform should have a ≈ 0.5
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((m.scale() - 0.5).abs() < 1e-4, "scale = {}", m.scale());
        assert!(m.rotation().abs() < 1e-4);
    }

    #[test]
    fn test_rotated_translated_recovery() {
        let theta = 0.3f32;
        let truth = SimilarityTransform {
            a: 1.7 * theta.cos(),
            b: 1.7 * theta.sin(),
            tx: -40.0,
            ty: 12.5,
        };
        let src: Landmarks = [
            (80.0, 60.0),
            (120.0, 62.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 111.0),
        ];
        let dst = src.map(|p| truth.apply(p));
        let m = SimilarityTransform::estimate(&src, &dst).unwrap();
        assert!((m.a - truth.a).abs() < 1e-3);
        assert!((m.b - truth.b).abs() < 1e-3);
        assert!((m.tx - truth.tx).abs() < 1e-2);
        assert!((m.ty - truth.ty).abs() < 1e-2);
    }

    #[test]
    fn test_coincident_landmarks_fail() {
        let src = [(50.0, 50.0); 5];
        let err = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap_err();
        assert!(matches!(err, AlignmentError::Coincident { .. }));
    }

    #[test]
    fn test_collinear_landmarks_fail() {
        let src = [(10.0, 10.0), (20.0, 20.0), (30.0, 30.0), (40.0, 40.0), (50.0, 50.0)];
        let err = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap_err();
        assert!(matches!(err, AlignmentError::Collinear { .. }));
    }

    #[test]
    fn test_non_finite_landmarks_fail() {
        let mut src = REFERENCE_LANDMARKS_112;
        src[2].0 = f32::NAN;
        assert_eq!(
            SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS_112).unwrap_err(),
            AlignmentError::NonFinite
        );
    }

    #[test]
    fn test_out_of_bounds_filled_with_zero() {
        let image = patterned(20, 20);
        let shift = SimilarityTransform {
            tx: 50.0,
            ..SimilarityTransform::IDENTITY
        };
        let out = warp_affine(&image, &shift, 112).unwrap();
        assert_eq!(out.rgb(0, 0), [0, 0, 0]);
        assert_eq!(out.rgb(111, 111), [0, 0, 0]);
        assert_eq!(out.rgb(55, 5), image.rgb(5, 5));
    }

    #[test]
    fn test_landmark_roundtrip() {
        // Paint a bright patch at the left eye; it should land near the reference eye.
        let w = 200usize;
        let h = 200usize;
        let mut data = vec![0u8; w * h * 3];

        let src_landmarks: Landmarks = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let lx = src_landmarks[0].0 as usize;
        let ly = src_landmarks[0].1 as usize;
        for py in ly - 2..=ly + 2 {
            for px in lx - 2..=lx + 2 {
                data[(py * w + px) * 3..(py * w + px) * 3 + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        let image = Image::new(data, w as u32, h as u32, ChannelOrder::Rgb).unwrap();

        let aligned = align_face(&image, &src_landmarks).unwrap();

        let ref_x = REFERENCE_LANDMARKS_112[0].0.round() as usize;
        let ref_y = REFERENCE_LANDMARKS_112[0].1.round() as usize;
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.rgb(x, y)[0]);
            }
        }
        assert!(
            max_val > 100,
            "expected bright patch near reference left eye ({ref_x}, {ref_y}), max={max_val}"
        );
    }
}
