// SPDX-License-Identifier: GPL-3.0-only

//! Crop resolver
//!
//! Rasterizes a user-adjusted rectangle of a still image into a new buffer
//! of exactly `width × height` pixels at source resolution. Parts of the
//! rectangle that fall outside the source are left transparent instead of
//! being rejected, so a slightly over-dragged crop still produces an image.

use crate::constants::decode::MAX_CROP_PIXELS;
use crate::errors::CropError;
use crate::media::{ImageBlob, RawImageSource};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::{debug, info};

/// A crop rectangle in source-image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Canvas size in pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Reject empty regions and canvases larger than `max_pixels`
    pub fn check(&self, max_pixels: u64) -> Result<(), CropError> {
        if self.is_empty() {
            return Err(CropError::EmptyRegion);
        }
        if self.area() > max_pixels {
            return Err(CropError::RegionTooLarge {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl std::str::FromStr for CropRegion {
    type Err = String;

    /// Parse `X,Y,W,H`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid crop region '{}': {}", s, e))?;
        match parts.as_slice() {
            [x, y, w, h] => Ok(Self::new(*x, *y, *w, *h)),
            _ => Err(format!("crop region must be X,Y,W,H, got '{}'", s)),
        }
    }
}

impl std::fmt::Display for CropRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Crops still images and re-encodes the result as JPEG
#[derive(Debug, Clone, Copy)]
pub struct CropResolver {
    jpeg_quality: u8,
}

impl CropResolver {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }

    /// Crop `region` out of `source`
    ///
    /// Loading, drawing and encoding all run off the async runtime.
    pub async fn crop(
        &self,
        source: &RawImageSource,
        region: CropRegion,
    ) -> Result<ImageBlob, CropError> {
        region.check(MAX_CROP_PIXELS)?;
        info!(kind = source.kind(), %region, "Rasterizing crop");

        let source = source.clone();
        let quality = self.jpeg_quality;
        tokio::task::spawn_blocking(move || {
            let image = load_source(&source)?;
            let canvas = rasterize_region(&image, region)?;
            let bytes = encode_jpeg(canvas, quality)?;
            debug!(size = bytes.len(), "Crop encoded");
            Ok(ImageBlob::new("image/jpeg", bytes))
        })
        .await
        .map_err(|e| CropError::SourceUnreadable(format!("crop task failed: {}", e)))?
    }
}

impl Default for CropResolver {
    fn default() -> Self {
        Self::new(crate::constants::EncodeQuality::Crop.jpeg_quality())
    }
}

/// Decode any still source into a raster
pub fn load_source(source: &RawImageSource) -> Result<DynamicImage, CropError> {
    let unreadable = |e: image::ImageError| CropError::SourceUnreadable(e.to_string());
    match source {
        RawImageSource::File(file) => image::load_from_memory(file.bytes()).map_err(unreadable),
        RawImageSource::Blob(blob) => image::load_from_memory(blob.bytes()).map_err(unreadable),
        RawImageSource::ObjectUrl(preview) => {
            let bytes = std::fs::read(preview.path()).map_err(|e| {
                CropError::SourceUnreadable(format!("preview {} is gone: {}", preview.id(), e))
            })?;
            image::load_from_memory(&bytes).map_err(unreadable)
        }
        RawImageSource::Frame(frame) => {
            let pixels = frame.packed_rgba().into_owned();
            RgbaImage::from_raw(frame.width, frame.height, pixels)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| {
                    CropError::SourceUnreadable("frame buffer does not match its size".into())
                })
        }
    }
}

/// Draw `region` of `image` onto a transparent canvas of the region's size
pub fn rasterize_region(image: &DynamicImage, region: CropRegion) -> Result<RgbaImage, CropError> {
    region.check(MAX_CROP_PIXELS)?;
    let mut canvas = RgbaImage::new(region.width, region.height);
    let source = image.to_rgba8();
    image::imageops::overlay(
        &mut canvas,
        &source,
        -(region.x as i64),
        -(region.y as i64),
    );
    Ok(canvas)
}

fn encode_jpeg(canvas: RgbaImage, quality: u8) -> Result<Vec<u8>, CropError> {
    // JPEG has no alpha; out-of-bounds padding flattens to black
    let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{embed, png_bytes, qr_gray};
    use image::{GenericImageView, Rgba};

    #[test]
    fn test_parse_region() {
        let region: CropRegion = "10, 20,30,40".parse().unwrap();
        assert_eq!(region, CropRegion::new(10, 20, 30, 40));
        assert!("1,2,3".parse::<CropRegion>().is_err());
        assert!("a,b,c,d".parse::<CropRegion>().is_err());
    }

    #[test]
    fn test_rasterize_keeps_exact_size_and_pads_outside() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([200, 0, 0, 255])));
        let canvas = rasterize_region(&image, CropRegion::new(5, 5, 10, 10)).unwrap();
        assert_eq!(canvas.dimensions(), (10, 10));
        assert_eq!(canvas.get_pixel(0, 0), &Rgba([200, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(4, 4), &Rgba([200, 0, 0, 255]));
        assert_eq!(canvas.get_pixel(5, 5)[3], 0);
        assert_eq!(canvas.get_pixel(9, 0)[3], 0);
    }

    #[tokio::test]
    async fn test_crop_blob_produces_jpeg_of_region_size() {
        let photo = embed(&qr_gray("crop me", 3), 600, 400, 350, 200);
        let source = RawImageSource::Blob(ImageBlob::new("image/png", png_bytes(&photo)));

        let blob = CropResolver::default()
            .crop(&source, CropRegion::new(340, 190, 120, 130))
            .await
            .unwrap();
        assert_eq!(blob.mime(), "image/jpeg");
        let decoded = image::load_from_memory(blob.bytes()).unwrap();
        assert_eq!(decoded.dimensions(), (120, 130));
    }

    #[tokio::test]
    async fn test_crop_errors() {
        let source = RawImageSource::Blob(ImageBlob::new("image/png", vec![1u8, 2, 3]));
        let resolver = CropResolver::default();
        assert_eq!(
            resolver.crop(&source, CropRegion::new(0, 0, 0, 5)).await,
            Err(CropError::EmptyRegion)
        );
        assert!(matches!(
            resolver.crop(&source, CropRegion::new(0, 0, 5, 5)).await,
            Err(CropError::SourceUnreadable(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_region_is_rejected_before_allocating() {
        let small = image::GrayImage::from_pixel(100, 100, image::Luma([255]));
        let source = RawImageSource::Blob(ImageBlob::new("image/png", png_bytes(&small)));

        let result = CropResolver::default()
            .crop(&source, CropRegion::new(0, 0, 30_000, 30_000))
            .await;
        assert_eq!(
            result,
            Err(CropError::RegionTooLarge {
                width: 30_000,
                height: 30_000
            })
        );

        let image = DynamicImage::ImageLuma8(small);
        assert!(rasterize_region(&image, CropRegion::new(0, 0, u32::MAX, 2)).is_err());
    }

    #[test]
    fn test_region_check_limit() {
        assert_eq!(CropRegion::new(0, 0, 0, 10).check(100), Err(CropError::EmptyRegion));
        assert!(CropRegion::new(0, 0, 10, 10).check(100).is_ok());
        assert!(CropRegion::new(0, 0, 10, 11).check(100).is_err());
    }
}
