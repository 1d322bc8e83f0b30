//! Frame type and pixel conversions: YUYV/Y16 to grayscale, dark detection.

use image::{DynamicImage, GrayImage, RgbImage};

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Build a frame from raw grayscale bytes, computing the dark flag.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&data, 0.95);
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        }
    }

    /// Time since the frame was captured.
    pub fn age(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }

    /// Copy the pixels into an 8-bit luma image.
    pub fn to_luma_image(&self) -> Result<GrayImage, FrameError> {
        let expected = (self.width * self.height) as usize;
        GrayImage::from_raw(self.width, self.height, self.data.clone()).ok_or(
            FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            },
        )
    }

    /// Expand to RGB so colored annotations can be drawn on top.
    pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
        Ok(DynamicImage::ImageLuma8(self.to_luma_image()?).to_rgb8())
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
/// Grayscale = every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits by keeping the high byte.
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    Ok(y16[..expected]
        .chunks_exact(2)
        .map(|px| u16::from_le_bytes([px[0], px[1]]) >> 8)
        .map(|v| v as u8)
        .collect())
}

/// True if more than `threshold_pct` of pixels are near black (< 32).
///
/// Empty frames count as dark.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
