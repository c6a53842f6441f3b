//! Decoded frame type and the synthetic test-frame generator.

use crate::error::FrameError;

/// Bytes per pixel of a packed BGR24 raster.
pub const BGR_CHANNELS: usize = 3;

/// Tello default stream resolution.
pub const DEFAULT_WIDTH: usize = 960;
pub const DEFAULT_HEIGHT: usize = 720;

/// One decoded picture as packed BGR24, rows `stride` bytes apart.
///
/// Channel order is blue-green-red to stay compatible with consumers written
/// against libh264decoder / OpenCV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    image: Vec<u8>,
    width: usize,
    height: usize,
    stride: usize,
}

impl DecodedFrame {
    /// Wraps an existing BGR raster, validating its geometry.
    pub fn new(
        image: Vec<u8>,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimension { width, height });
        }
        let row = width * BGR_CHANNELS;
        if stride < row {
            return Err(FrameError::StrideTooSmall { stride, row });
        }
        let expected = stride * height;
        if image.len() < expected {
            return Err(FrameError::ShortBuffer {
                expected,
                actual: image.len(),
                stride,
                height,
            });
        }
        Ok(Self {
            image,
            width,
            height,
            stride,
        })
    }

    /// Tightly packed raster (`stride == width * 3`).
    pub fn packed(image: Vec<u8>, width: usize, height: usize) -> Result<Self, FrameError> {
        Self::new(image, width, height, width * BGR_CHANNELS)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn channels(&self) -> usize {
        BGR_CHANNELS
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Row `y` without stride padding.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.image[start..start + self.width * BGR_CHANNELS]
    }

    /// `[b, g, r]` at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let offset = y * self.stride + x * BGR_CHANNELS;
        [
            self.image[offset],
            self.image[offset + 1],
            self.image[offset + 2],
        ]
    }

    /// `(frame, width, height, linesize)`, the tuple shape the reference
    /// decoder hands back.
    pub fn into_parts(self) -> (Vec<u8>, usize, usize, usize) {
        (self.image, self.width, self.height, self.stride)
    }
}

/// Builds a synthetic frame for exercising preview/recognition code without
/// a live decoder: channel 0 (blue) is a left-to-right gradient from 0 to 255,
/// green and red are zero.
///
/// Fails with [`FrameError::InvalidDimension`] if either dimension is zero.
pub fn make_test_frame(width: usize, height: usize) -> Result<DecodedFrame, FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::InvalidDimension { width, height });
    }

    Ok(gradient_frame(width, height))
}

/// [`make_test_frame`] at the Tello's native 960x720.
pub fn make_default_test_frame() -> DecodedFrame {
    gradient_frame(DEFAULT_WIDTH, DEFAULT_HEIGHT)
}

fn gradient_frame(width: usize, height: usize) -> DecodedFrame {
    let stride = width * BGR_CHANNELS;
    let mut row = vec![0u8; stride];
    for x in 0..width {
        row[x * BGR_CHANNELS] = gradient_value(x, width);
    }

    let mut image = Vec::with_capacity(stride * height);
    for _ in 0..height {
        image.extend_from_slice(&row);
    }

    DecodedFrame {
        image,
        width,
        height,
        stride,
    }
}

// Evenly spaced 0..=255 across the row, truncated like an f64 -> u8 cast.
fn gradient_value(x: usize, width: usize) -> u8 {
    if width <= 1 {
        return 0;
    }
    (x * 255 / (width - 1)) as u8
}
