//! Owned colour frames.
//!
//! - `Frame`: one decoded RGB image, origin top-left, in the same coordinate space as
//!   region polygons. The core never scales or crops it.
//!
//! Decoding and acquisition live at the edge of the crate (`Frame::open`,
//! `Frame::decode`). Anything that reaches the classifier has non-zero dimensions and a
//! pixel buffer that matches them.

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use std::path::Path;

use crate::error::OccupancyError;

/// Default JPEG quality for served and written frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap a packed RGB24 buffer.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| OccupancyError::invalid_frame("RGB frame dimensions overflow"))?
            as usize;
        if pixels.len() != expected {
            return Err(OccupancyError::invalid_frame(format!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ))
            .into());
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| OccupancyError::invalid_frame("RGB buffer rejected"))?;
        Self::from_image(image)
    }

    pub fn from_image(image: RgbImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(OccupancyError::invalid_frame(format!(
                "frame must have non-zero dimensions, got {}x{}",
                image.width(),
                image.height()
            ))
            .into());
        }
        Ok(Self { image })
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        Self::from_image(image.to_rgb8())
    }

    /// Frame of a single colour.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        Self::from_image(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// Decode an encoded image (JPEG or PNG).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| OccupancyError::frame_decode(format!("failed to decode frame: {}", e)))?;
        Self::from_dynamic(image)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow!("failed to read image {}: {}", path.display(), e))?;
        let image = image::load_from_memory(&bytes).map_err(|e| {
            OccupancyError::frame_decode(format!("failed to decode {}: {}", path.display(), e))
        })?;
        Self::from_dynamic(image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub(crate) fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Single-channel intensity using BT.601 weights, rounded.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let Rgb([r, g, b]) = *self.image.get_pixel(x, y);
            let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            Luma([y.round().clamp(0.0, 255.0) as u8])
        })
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        if !(1..=100).contains(&quality) {
            return Err(OccupancyError::configuration(format!(
                "jpeg quality must be in 1..=100, got {}",
                quality
            ))
            .into());
        }
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&self.image)
            .map_err(|e| anyhow!("jpeg encoding failed: {}", e))?;
        Ok(buf)
    }

    /// Write the frame; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .map_err(|e| anyhow!("failed to write image {}: {}", path.display(), e))
    }
}
