// THEORY:
// `Image` is the only input the engine accepts: an owned, immutable buffer of
// 3-channel 8-bit pixels in row-major order. It is a "dumb" data container in
// the same spirit as a single pixel, except that it also knows which channel
// order its bytes use, so a BGR frame coming straight off a camera library can
// be handed over without a copy.
//
// Validation happens once, at construction. Every later stage can rely on
// `width * height * 3 == data.len()` and on both sides being non-zero.

use crate::error::{VisionError, VisionResult};
use image::{DynamicImage, GrayImage, RgbImage};

pub const CHANNELS: usize = 3;

/// Order of the three colour channels inside each pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// An owned, validated 3-channel 8-bit image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    order: ChannelOrder,
    data: Vec<u8>,
}

impl Image {
    /// Wraps a raw interleaved buffer after checking that its length matches.
    pub fn from_raw(width: u32, height: u32, order: ChannelOrder, data: Vec<u8>) -> VisionResult<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(VisionError::InvalidImage {
                width,
                height,
                len: data.len(),
                expected,
            });
        }
        Ok(Self {
            width,
            height,
            order,
            data,
        })
    }

    /// Decodes any format the `image` crate understands (PNG, JPEG, ...).
    pub fn decode(bytes: &[u8]) -> VisionResult<Self> {
        let decoded = image::load_from_memory(bytes).map_err(VisionError::Decode)?;
        Self::from_dynamic(decoded)
    }

    pub fn from_dynamic(image: DynamicImage) -> VisionResult<Self> {
        Self::from_rgb(image.into_rgb8())
    }

    pub fn from_rgb(image: RgbImage) -> VisionResult<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, ChannelOrder::Rgb, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.order
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the pixel at `(x, y)` as `(red, green, blue)` regardless of storage order,
    /// or `None` outside the image.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let px = self.data.get(index..index + CHANNELS)?;
        Some(match self.order {
            ChannelOrder::Rgb => (px[0], px[1], px[2]),
            ChannelOrder::Bgr => (px[2], px[1], px[0]),
        })
    }

    /// Rec. 601 luma of every pixel, rounded to the nearest level.
    pub fn to_luma(&self) -> GrayImage {
        let (r_idx, b_idx) = match self.order {
            ChannelOrder::Rgb => (0, 2),
            ChannelOrder::Bgr => (2, 0),
        };
        let luma: Vec<u8> = self
            .data
            .chunks_exact(CHANNELS)
            .map(|px| luminance(px[r_idx], px[1], px[b_idx]))
            .collect();
        // Length is guaranteed by construction.
        GrayImage::from_raw(self.width, self.height, luma)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Converts back to an `RgbImage`, e.g. for drawing annotations.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let (r, g, b) = self.rgb_at(x, y).unwrap_or_default();
            image::Rgb([r, g, b])
        })
    }
}

/// Luminance estimate (Rec. 601 luma) quantised back to 0..=255.
#[inline]
pub fn luminance(red: u8, green: u8, blue: u8) -> u8 {
    let luma = 0.299_f64 * red as f64 + 0.587_f64 * green as f64 + 0.114_f64 * blue as f64;
    luma.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Image::from_raw(4, 4, ChannelOrder::Rgb, vec![0; 47]).unwrap_err();
        match err {
            VisionError::InvalidImage { len, expected, .. } => {
                assert_eq!(len, 47);
                assert_eq!(expected, 48);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_image() {
        assert!(Image::from_raw(0, 10, ChannelOrder::Rgb, Vec::new()).is_err());
    }

    #[test]
    fn luma_weights_follow_rec601() {
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(0, 0, 0), 0);
        assert_eq!(luminance(255, 0, 0), 76);
        assert_eq!(luminance(0, 255, 0), 150);
        assert_eq!(luminance(0, 0, 255), 29);
    }

    #[test]
    fn bgr_order_is_honoured() {
        let rgb = Image::from_raw(1, 1, ChannelOrder::Rgb, vec![200, 10, 30]).unwrap();
        let bgr = Image::from_raw(1, 1, ChannelOrder::Bgr, vec![30, 10, 200]).unwrap();
        assert_eq!(rgb.rgb_at(0, 0), bgr.rgb_at(0, 0));
        assert_eq!(rgb.to_luma(), bgr.to_luma());
    }

    #[test]
    fn pixel_lookup_outside_the_image_is_none() {
        let image = Image::from_raw(2, 3, ChannelOrder::Bgr, (0..18).collect()).unwrap();
        assert_eq!(image.rgb_at(1, 2), Some((17, 16, 15)));
        assert_eq!(image.rgb_at(2, 0), None);
        assert_eq!(image.rgb_at(0, 3), None);
        assert_eq!(image.rgb_at(u32::MAX, u32::MAX), None);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = Image::decode(b"definitely not a png").unwrap_err();
        assert!(matches!(err, VisionError::Decode(_)));
    }
}
