// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic QR fixtures for unit tests

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;

/// Render `content` as a dark-on-light QR symbol with the standard quiet zone
pub fn qr_gray(content: &str, module_px: u32) -> GrayImage {
    qrcode::QrCode::new(content.as_bytes())
        .expect("test payload fits in a QR code")
        .render::<Luma<u8>>()
        .module_dimensions(module_px, module_px)
        .build()
}

/// Swap dark and light
pub fn invert(image: &GrayImage) -> GrayImage {
    let mut out = image.clone();
    image::imageops::invert(&mut out);
    out
}

/// Place `small` on a white canvas at (`x`, `y`)
pub fn embed(small: &GrayImage, width: u32, height: u32, x: u32, y: u32) -> GrayImage {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    image::imageops::overlay(&mut canvas, small, x as i64, y as i64);
    canvas
}

/// Encode a grayscale image as PNG bytes
pub fn png_bytes(image: &GrayImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut out, ImageFormat::Png)
        .expect("PNG encoding to memory");
    out.into_inner()
}

/// Fresh scratch directory under the system temp dir
pub fn scratch_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("qsend-{}-{}", tag, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}
