//! Separable Gaussian filtering on 8-bit grey images with explicit border handling.

use image::{GrayImage, Luma};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Border {
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

/// Sigma used when none is given explicitly: `0.3 * ((k - 1) / 2 - 1) + 0.8`.
pub fn sigma_for_kernel(ksize: u32) -> f64 {
    0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1-D Gaussian weights for an odd `ksize`.
///
/// Sizes up to 7 use the fixed binomial tables; larger sizes sample the Gaussian at
/// `sigma_for_kernel(ksize)`.
pub fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    match ksize {
        1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![
            0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
        ],
        _ => {
            let sigma = sigma_for_kernel(ksize);
            let center = (ksize as f64 - 1.0) / 2.0;
            let weights: Vec<f64> = (0..ksize)
                .map(|i| {
                    let d = i as f64 - center;
                    (-(d * d) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let sum: f64 = weights.iter().sum();
            weights.into_iter().map(|w| (w / sum) as f32).collect()
        }
    }
}

fn border_index(i: i64, len: i64, border: Border) -> usize {
    if len == 1 {
        return 0;
    }
    match border {
        Border::Replicate => i.clamp(0, len - 1) as usize,
        Border::Reflect101 => {
            let mut i = i;
            loop {
                if i < 0 {
                    i = -i;
                } else if i >= len {
                    i = 2 * (len - 1) - i;
                } else {
                    return i as usize;
                }
            }
        }
    }
}

/// Convolve with a `ksize x ksize` Gaussian (horizontal then vertical pass).
pub fn gaussian_blur(image: &GrayImage, ksize: u32, border: Border) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || ksize <= 1 {
        return image.clone();
    }
    let kernel = gaussian_kernel(ksize);
    let radius = (ksize / 2) as i64;
    let (wi, hi) = (w as i64, h as i64);
    let src = image.as_raw();

    let mut horizontal = vec![0f32; (w * h) as usize];
    for y in 0..hi {
        let row = (y * wi) as usize;
        for x in 0..wi {
            let mut acc = 0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = border_index(x + k as i64 - radius, wi, border);
                acc += weight * src[row + sx] as f32;
            }
            horizontal[row + x as usize] = acc;
        }
    }

    GrayImage::from_fn(w, h, |x, y| {
        let mut acc = 0f32;
        for (k, weight) in kernel.iter().enumerate() {
            let sy = border_index(y as i64 + k as i64 - radius, hi, border);
            acc += weight * horizontal[sy * w as usize + x as usize];
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}
