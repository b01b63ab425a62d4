// THEORY:
// Both the preprocessor (denoising) and the segmenter (local mean for adaptive
// thresholding) need a Gaussian blur with an exact, fixed kernel size. The
// `imageproc` Gaussian blur derives its kernel size from sigma, so the kernel
// is built here from the size and handed to `imageproc`'s separable filter.
//
// Filtering runs on an f32 copy of the image and only the final value is
// rounded back to 8 bits. `imageproc` pads by continuity, which is exactly the
// `Replicate` border. For `Reflect101` the image is first padded by the kernel
// radius with mirrored samples, filtered, and cropped back, so the clamped
// reads never reach the result.

use crate::error::{VisionError, VisionResult};
use image::{GrayImage, ImageBuffer, Luma, imageops};
use imageproc::filter::separable_filter_equal;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// How samples outside the image are synthesised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

impl Border {
    #[inline]
    fn resolve(self, index: i64, len: i64) -> usize {
        if len == 1 {
            return 0;
        }
        let resolved = match self {
            Border::Replicate => index.clamp(0, len - 1),
            Border::Reflect101 => {
                let period = 2 * (len - 1);
                let folded = index.rem_euclid(period);
                if folded < len { folded } else { period - folded }
            }
        };
        resolved as usize
    }
}

/// Sigma used when none is given: `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
pub fn sigma_for_kernel(size: u32) -> f64 {
    0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// A normalised 1D Gaussian kernel of odd length.
pub fn gaussian_kernel(size: u32, sigma: f64) -> VisionResult<Vec<f32>> {
    if size == 0 || size % 2 == 0 {
        return Err(VisionError::invalid_parameter(
            "kernel_size",
            format!("Gaussian kernel size must be odd, got {size}"),
        ));
    }
    let sigma = if sigma > 0.0 { sigma } else { sigma_for_kernel(size) };
    let radius = (size / 2) as i64;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|offset| (-((offset * offset) as f64) / denom).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

/// Separable Gaussian blur with an exact kernel size.
pub fn gaussian_blur(image: &GrayImage, size: u32, sigma: f64, border: Border) -> VisionResult<GrayImage> {
    let kernel = gaussian_kernel(size, sigma)?;
    let (width, height) = image.dimensions();
    let blurred = match border {
        Border::Replicate => separable_filter_equal(&to_float(image), &kernel),
        Border::Reflect101 => {
            let radius = size / 2;
            let padded = pad_reflect101(image, radius);
            let filtered = separable_filter_equal(&padded, &kernel);
            imageops::crop_imm(&filtered, radius, radius, width, height).to_image()
        }
    };
    Ok(GrayImage::from_fn(width, height, |x, y| {
        Luma([saturate(blurred.get_pixel(x, y)[0])])
    }))
}

fn to_float(image: &GrayImage) -> FloatImage {
    FloatImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] as f32])
    })
}

/// Copies `image` into a buffer `radius` pixels larger on every side, mirroring at the edges.
fn pad_reflect101(image: &GrayImage, radius: u32) -> FloatImage {
    let (width, height) = image.dimensions();
    let (w, h, r) = (width as i64, height as i64, radius as i64);
    FloatImage::from_fn(width + 2 * radius, height + 2 * radius, |x, y| {
        let sx = Border::Reflect101.resolve(x as i64 - r, w);
        let sy = Border::Reflect101.resolve(y as i64 - r, h);
        Luma([image.get_pixel(sx as u32, sy as u32)[0] as f32])
    })
}

#[inline]
fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
