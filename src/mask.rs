//! Full-frame binary masks.

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma};

use crate::region::Region;

pub const MASK_ON: u8 = 255;

/// Binary image stored as 0 / 255 so it can be handed to `imageproc` directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Any non-zero pixel counts as set.
    pub fn from_gray(image: GrayImage) -> Self {
        let mut image = image;
        for p in image.pixels_mut() {
            if p.0[0] != 0 {
                p.0[0] = MASK_ON;
            }
        }
        Self { image }
    }

    /// Area mask of `region`: pixels inside or on the polygon boundary, clipped to the frame.
    pub fn from_region(region: &Region, width: u32, height: u32) -> Self {
        let mut mask = Self::empty(width, height);
        if width == 0 || height == 0 {
            return mask;
        }
        let (min, max) = region.bounds();
        let x0 = min.x.max(0);
        let y0 = min.y.max(0);
        let x1 = max.x.min(width as i32 - 1);
        let y1 = max.y.min(height as i32 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if region.contains(x, y) {
                    mask.image.put_pixel(x as u32, y as u32, Luma([MASK_ON]));
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y).0[0] != 0
    }

    pub fn count(&self) -> u64 {
        self.image.as_raw().iter().filter(|&&v| v != 0).count() as u64
    }

    /// Number of pixels set in both masks.
    pub fn count_and(&self, other: &Mask) -> Result<u64> {
        self.ensure_same_size(other)?;
        Ok(self
            .image
            .as_raw()
            .iter()
            .zip(other.image.as_raw())
            .filter(|(&a, &b)| a != 0 && b != 0)
            .count() as u64)
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    fn ensure_same_size(&self, other: &Mask) -> Result<()> {
        if self.image.dimensions() != other.image.dimensions() {
            return Err(anyhow!(
                "mask size mismatch: {:?} vs {:?}",
                self.image.dimensions(),
                other.image.dimensions()
            ));
        }
        Ok(())
    }
}
