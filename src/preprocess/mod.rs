//! Frame preprocessing: one colour frame in, two full-frame binary masks out.
//!
//! Stages, in order:
//! 1. BT.601 intensity
//! 2. `blur_kernel` Gaussian blur (reflect-101 border)
//! 3. texture mask: inverted adaptive threshold against a Gaussian-weighted local mean,
//!    then a morphological close with the 3x3 cross element
//! 4. edge mask: Canny hysteresis on the blurred intensity
//!
//! `imageproc::edges::canny` runs its own Gaussian (sigma 1.4) before the Sobel step, so
//! edges are found on an image smoothed twice. Expect a sparser edge mask than a
//! single-smoothing Canny gives for the same `canny_low`/`canny_high`, and tune
//! `edge_ratio_threshold` with that in mind.
//!
//! Every stage is deterministic and keeps no state between frames.

pub mod filter;

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

use crate::config::EngineConfig;
use crate::frame::Frame;
use crate::mask::{Mask, MASK_ON};

use filter::Border;

/// Global masks derived from one frame.
#[derive(Clone, Debug)]
pub struct FrameMasks {
    pub texture: Mask,
    pub edges: Mask,
}

pub fn preprocess(frame: &Frame, config: &EngineConfig) -> FrameMasks {
    let gray = frame.to_luma();
    let blurred = filter::gaussian_blur(&gray, config.blur_kernel, Border::Reflect101);

    let thresholded =
        adaptive_threshold_inv(&blurred, config.adaptive_block_size, config.adaptive_bias);
    let texture = Mask::from_gray(close(&thresholded, config.close_iterations));

    let edges = if config.edge_detection {
        Mask::from_gray(imageproc::edges::canny(
            &blurred,
            config.canny_low as f32,
            config.canny_high as f32,
        ))
    } else {
        Mask::empty(frame.width(), frame.height())
    };

    log::debug!(
        "preprocess {}x{}: texture={} edges={}",
        frame.width(),
        frame.height(),
        texture.count(),
        edges.count()
    );

    FrameMasks { texture, edges }
}

/// Foreground where a pixel is at least `bias` darker than its Gaussian-weighted
/// `block_size x block_size` neighbourhood mean.
pub fn adaptive_threshold_inv(image: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    let mean = filter::gaussian_blur(image, block_size, Border::Replicate);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let src = image.get_pixel(x, y).0[0] as i32;
        let local = mean.get_pixel(x, y).0[0] as i32;
        if src - local <= -bias {
            Luma([MASK_ON])
        } else {
            Luma([0])
        }
    })
}

/// Dilate then erode with the 3x3 cross, `iterations` times each.
///
/// Repeating the cross element `k` times is the L1 ball of radius `k`.
pub fn close(mask: &GrayImage, iterations: u8) -> GrayImage {
    if iterations == 0 {
        return mask.clone();
    }
    imageproc::morphology::close(mask, Norm::L1, iterations)
}
