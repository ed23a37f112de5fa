//! Decoded pixel buffers and bilinear resampling.

use std::path::Path;
use thiserror::Error;

/// Number of interleaved channels in every [`Image`].
pub const CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("invalid buffer length for {width}x{height}: expected {expected}, got {actual}")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Byte order of the three interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// An immutable, decoded 8-bit 3-channel image.
#[derive(Debug, Clone)]
pub struct Image {
    data: Vec<u8>,
    width: u32,
    height: u32,
    order: ChannelOrder,
}

impl Image {
    /// Wrap an interleaved pixel buffer of `width * height * 3` bytes.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
    ) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(ImageError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            order,
        })
    }

    /// Decode an image file of any format supported by the `image` crate.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let decoded = image::open(path.as_ref())?.to_rgb8();
        Self::from_rgb_image(decoded)
    }

    /// Decode an in-memory encoded image (PNG, JPEG, ...).
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        let decoded = image::load_from_memory(bytes)?.to_rgb8();
        Self::from_rgb_image(decoded)
    }

    pub fn from_rgb_image(rgb: image::RgbImage) -> Result<Self, ImageError> {
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, ChannelOrder::Rgb)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Raw interleaved bytes in [`Self::order`].
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (x, y) as [R, G, B], regardless of storage order.
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let off = (y * self.width as usize + x) * CHANNELS;
        let px = [self.data[off], self.data[off + 1], self.data[off + 2]];
        match self.order {
            ChannelOrder::Rgb => px,
            ChannelOrder::Bgr => [px[2], px[1], px[0]],
        }
    }

    /// Resample to `new_width × new_height` with bilinear interpolation.
    pub fn resized(&self, new_width: u32, new_height: u32) -> Image {
        let data = bilinear_resize(
            &self.data,
            self.width as usize,
            self.height as usize,
            new_width.max(1) as usize,
            new_height.max(1) as usize,
        );
        Image {
            data,
            width: new_width.max(1),
            height: new_height.max(1),
            order: self.order,
        }
    }

    /// Downscale so the longer side is at most `max_side`, preserving aspect ratio.
    ///
    /// Returns the image unchanged when it already fits or `max_side` is 0.
    pub fn limit_size(self, max_side: u32) -> Image {
        let longest = self.width.max(self.height);
        if max_side == 0 || longest <= max_side {
            return self;
        }
        let scale = max_side as f32 / longest as f32;
        let new_w = ((self.width as f32 * scale) as u32).max(1);
        let new_h = ((self.height as f32 * scale) as u32).max(1);
        tracing::debug!(
            from_width = self.width,
            from_height = self.height,
            to_width = new_w,
            to_height = new_h,
            "downscaling oversized image"
        );
        self.resized(new_w, new_h)
    }
}

/// Bilinear resize of an interleaved 3-channel buffer using pixel-center alignment.
pub(crate) fn bilinear_resize(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;
    let mut resized = vec![0u8; new_w * new_h * CHANNELS];

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..CHANNELS {
                let tl = src[(y0 * width + x0) * CHANNELS + c] as f32;
                let tr = src[(y0 * width + x1) * CHANNELS + c] as f32;
                let bl = src[(y1 * width + x0) * CHANNELS + c] as f32;
                let br = src[(y1 * width + x1) * CHANNELS + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                resized[(y * new_w + x) * CHANNELS + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    resized
}
