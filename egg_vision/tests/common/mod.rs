//! Synthetic tray photos for the end-to-end tests.

#![allow(dead_code)]

use egg_vision::{ChannelOrder, Image};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

pub const BACKGROUND: Rgb<u8> = Rgb([230, 230, 230]);
pub const EGG: Rgb<u8> = Rgb([30, 30, 30]);

/// A light canvas with a dark filled disc for every `(cx, cy, radius)`.
pub fn discs(width: u32, height: u32, discs: &[(i32, i32, i32)]) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
    for &(cx, cy, radius) in discs {
        fill_disc(&mut canvas, cx, cy, radius, EGG);
    }
    canvas
}

/// Every pixel whose centre lies within `radius` of `(cx, cy)`.
pub fn fill_disc(canvas: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    for y in (cy - radius).max(0)..=(cy + radius).min(height - 1) {
        for x in (cx - radius).max(0)..=(cx + radius).min(width - 1) {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= radius * radius {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// A light canvas with one dark filled rectangle.
pub fn rectangle(width: u32, height: u32, x: i32, y: i32, rect_width: u32, rect_height: u32) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);
    draw_filled_rect_mut(&mut canvas, Rect::at(x, y).of_size(rect_width, rect_height), EGG);
    canvas
}

pub fn rgb(canvas: RgbImage) -> Image {
    Image::from_rgb(canvas).expect("synthetic image is valid")
}

/// The same picture with its channels stored blue-first.
pub fn bgr(canvas: &RgbImage) -> Image {
    let data = canvas
        .pixels()
        .flat_map(|Rgb([r, g, b])| [*b, *g, *r])
        .collect();
    Image::from_raw(canvas.width(), canvas.height(), ChannelOrder::Bgr, data).expect("synthetic image is valid")
}

pub fn png_bytes(canvas: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    canvas
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("png encoding succeeds");
    bytes.into_inner()
}

/// One large egg: radius 95, traced area well above 25000.
pub fn large_egg() -> RgbImage {
    discs(260, 260, &[(130, 130, 95)])
}

/// One small egg: radius 54, traced area between 8000 and 12000.
pub fn small_egg() -> RgbImage {
    discs(240, 240, &[(120, 120, 54)])
}

/// Five identical radius-84 eggs, traced area between 20000 and 25000 each.
pub fn tray_of_five() -> RgbImage {
    discs(
        640,
        440,
        &[
            (110, 110, 84),
            (320, 110, 84),
            (530, 110, 84),
            (215, 330, 84),
            (425, 330, 84),
        ],
    )
}

/// A 300x100 bar: large enough, but far too elongated to be an egg.
pub fn elongated_bar() -> RgbImage {
    rectangle(400, 240, 50, 70, 300, 100)
}
