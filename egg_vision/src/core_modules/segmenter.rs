// THEORY:
// The segmenter turns the denoised luminance image into a binary foreground
// mask. A single global threshold fails under the uneven lighting of a real
// tray photo, so every pixel is compared against a Gaussian-weighted mean of
// its own neighbourhood instead:
//
//   foreground  <=>  pixel <= local_mean - bias
//
// The comparison is inverted (darker than surroundings is foreground), which
// marks the dark side of every strong edge. For an egg on a contrasting
// background this yields a closed band hugging the outline, and the contour
// stage only looks at outer borders, so the band's outer boundary is the egg.
//
// Two morphology passes with an elliptical structuring element follow:
// opening removes isolated speckle, closing bridges small gaps in the band.

use crate::config::SegmentationConfig;
use crate::core_modules::filter::{self, Border};
use crate::error::{VisionError, VisionResult};
use image::{GrayImage, Luma};
use imageproc::morphology::{self, Mask as StructuringElement};

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Binary image: `FOREGROUND` or `BACKGROUND` per pixel.
pub type Mask = GrayImage;

pub fn segment(denoised: &GrayImage, config: &SegmentationConfig) -> VisionResult<Mask> {
    let thresholded = adaptive_threshold_inv(denoised, config.block_size, config.bias)?;
    let element = elliptical_element(config.morph_kernel_size)?;
    let opened = morphology::grayscale_open(&thresholded, &element);
    let mask = morphology::grayscale_close(&opened, &element);

    tracing::debug!(
        block_size = config.block_size,
        bias = config.bias,
        foreground = foreground_pixels(&mask),
        "segmented image"
    );
    Ok(mask)
}

/// Inverted Gaussian adaptive threshold.
pub fn adaptive_threshold_inv(image: &GrayImage, block_size: u32, bias: f64) -> VisionResult<Mask> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(VisionError::invalid_parameter(
            "block_size",
            format!("adaptive threshold block size must be odd and >= 3, got {block_size}"),
        ));
    }
    let local_mean = filter::gaussian_blur(image, block_size, 0.0, Border::Replicate)?;
    let mut mask = GrayImage::new(image.width(), image.height());
    for ((out, src), mean) in mask
        .pixels_mut()
        .zip(image.pixels())
        .zip(local_mean.pixels())
    {
        let is_foreground = src[0] as f64 <= mean[0] as f64 - bias;
        *out = Luma([if is_foreground { FOREGROUND } else { BACKGROUND }]);
    }
    Ok(mask)
}

/// Elliptical structuring element inscribed in a `size` x `size` square.
///
/// Row `dy` spans `round(r * sqrt(1 - dy^2 / r^2))` columns either side of the
/// centre, which gives the familiar 5x5 shape:
///
/// ```text
/// ..#..
/// #####
/// #####
/// #####
/// ..#..
/// ```
pub fn elliptical_element(size: u32) -> VisionResult<StructuringElement> {
    let layout = elliptical_layout(size)?;
    let radius = (size / 2) as u8;
    Ok(StructuringElement::from_image(&layout, radius, radius))
}

pub(crate) fn elliptical_layout(size: u32) -> VisionResult<GrayImage> {
    if size < 3 || size % 2 == 0 || size > 255 {
        return Err(VisionError::invalid_parameter(
            "morph_kernel_size",
            format!("structuring element size must be odd and within 3..=255, got {size}"),
        ));
    }
    let radius = (size / 2) as i64;
    let mut layout = GrayImage::new(size, size);
    for row in 0..size as i64 {
        let dy = row - radius;
        let half_span = (radius as f64
            * (((radius * radius - dy * dy) as f64) / (radius * radius) as f64).sqrt())
        .round() as i64;
        let start = (radius - half_span).max(0);
        let end = (radius + half_span).min(size as i64 - 1);
        for col in start..=end {
            layout.put_pixel(col as u32, row as u32, Luma([FOREGROUND]));
        }
    }
    Ok(layout)
}

fn foreground_pixels(mask: &Mask) -> usize {
    mask.pixels().filter(|p| p[0] == FOREGROUND).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_rows(size: u32) -> Vec<String> {
        let layout = elliptical_layout(size).unwrap();
        (0..size)
            .map(|y| {
                (0..size)
                    .map(|x| if layout.get_pixel(x, y)[0] == FOREGROUND { '#' } else { '.' })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn five_by_five_ellipse_shape() {
        assert_eq!(
            layout_rows(5),
            vec!["..#..", "#####", "#####", "#####", "..#.."]
        );
    }

    #[test]
    fn three_by_three_ellipse_is_a_cross() {
        assert_eq!(layout_rows(3), vec![".#.", "###", ".#."]);
    }

    #[test]
    fn uniform_image_has_no_foreground() {
        let flat = GrayImage::from_pixel(40, 30, Luma([180]));
        let mask = segment(&flat, &SegmentationConfig::default()).unwrap();
        assert_eq!(foreground_pixels(&mask), 0);
    }

    #[test]
    fn dark_side_of_an_edge_is_foreground() {
        // Left half dark, right half bright.
        let step = GrayImage::from_fn(40, 20, |x, _| Luma([if x < 20 { 40 } else { 220 }]));
        let mask = adaptive_threshold_inv(&step, 11, 2.0).unwrap();
        assert_eq!(mask.get_pixel(19, 10)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(20, 10)[0], BACKGROUND);
        assert_eq!(mask.get_pixel(2, 10)[0], BACKGROUND);
        assert_eq!(mask.get_pixel(37, 10)[0], BACKGROUND);
    }

    #[test]
    fn opening_removes_isolated_speckle() {
        let mut noisy = GrayImage::new(30, 30);
        noisy.put_pixel(15, 15, Luma([FOREGROUND]));
        noisy.put_pixel(16, 15, Luma([FOREGROUND]));
        let element = elliptical_element(5).unwrap();
        let opened = morphology::grayscale_open(&noisy, &element);
        assert_eq!(foreground_pixels(&opened), 0);
    }

    #[test]
    fn invalid_block_size_is_reported() {
        let flat = GrayImage::from_pixel(10, 10, Luma([0]));
        let err = adaptive_threshold_inv(&flat, 10, 2.0).unwrap_err();
        assert!(matches!(err, VisionError::InvalidParameter { name: "block_size", .. }));
    }
}
