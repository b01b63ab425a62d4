// THEORY:
// The preprocessor is the first stage of the detection pipeline. It collapses
// the colour image to a single luminance channel and then suppresses sensor
// noise and shell texture with a fixed-size Gaussian blur, so the segmenter's
// local thresholds react to egg outlines rather than to speckle.
//
// It is a pure function over an immutable `Image`: both outputs are new
// buffers with the input's dimensions.

use crate::config::PreprocessConfig;
use crate::core_modules::filter::{self, Border};
use crate::core_modules::image::Image;
use crate::error::VisionResult;
use image::GrayImage;

/// The two products of preprocessing.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub gray: GrayImage,
    pub denoised: GrayImage,
}

pub fn preprocess(image: &Image, config: &PreprocessConfig) -> VisionResult<Preprocessed> {
    let gray = image.to_luma();
    let denoised = filter::gaussian_blur(
        &gray,
        config.blur_kernel_size,
        config.blur_sigma,
        Border::Reflect101,
    )?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        kernel = config.blur_kernel_size,
        "preprocessed image"
    );
    Ok(Preprocessed { gray, denoised })
}
