// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection task
//!
//! This module implements QR code decoding using the rqrr crate.
//! Pixels are converted to grayscale and searched for a QR symbol twice:
//! once as-is and once inverted, so that light-on-dark codes shown on
//! dark-mode screens decode as well as printed dark-on-light ones.

use crate::app::frame_processor::types::{
    DecodedPayload, Detection, FrameDecoder, FrameRegion, Polarity, QrDetection,
};
use crate::backends::camera::types::CameraFrame;
use crate::errors::FrameFault;
use image::DynamicImage;
use image::imageops::FilterType;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// QR code decoder
///
/// Stateless; a single instance can be shared between the still-image path
/// and the camera scan loop.
#[derive(Debug, Clone, Default)]
pub struct QrDetector;

impl QrDetector {
    /// Create a new QR detector
    pub fn new() -> Self {
        Self
    }
}

/// Pixels waiting for a decoder
pub enum DecodeInput {
    /// Camera frame, decoded at native resolution
    Frame(CameraFrame),
    /// Still image, downscaled to fit `max_dimension` first
    Still {
        image: DynamicImage,
        max_dimension: u32,
    },
}

/// Run `decoder` over `input` on the blocking pool
///
/// Both the camera loop and the still-image path decode through here. A
/// panic inside the decoder is reported as [`FrameFault::DecoderPanicked`],
/// never propagated.
pub async fn decode_off_runtime(
    decoder: Arc<dyn FrameDecoder>,
    input: DecodeInput,
) -> Result<Detection, FrameFault> {
    tokio::task::spawn_blocking(move || match input {
        DecodeInput::Frame(frame) => {
            let pixels = frame.packed_rgba();
            decoder.decode(&pixels, frame.width, frame.height)
        }
        DecodeInput::Still {
            image,
            max_dimension,
        } => {
            let prepared = downscale_to_fit(&image, max_dimension);
            let rgba = prepared.to_rgba8();
            trace!(
                width = rgba.width(),
                height = rgba.height(),
                "Prepared still image for decoding"
            );
            decoder.decode(rgba.as_raw(), rgba.width(), rgba.height())
        }
    })
    .await
    .unwrap_or_else(|e| {
        warn!(error = %e, "QR detection task panicked");
        Err(FrameFault::DecoderPanicked(e.to_string()))
    })
}

impl FrameDecoder for QrDetector {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Result<Detection, FrameFault> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(FrameFault::BufferMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        let luma = luma_from_rgba(pixels);
        Ok(decode_luma(&luma, width, height))
    }
}

/// Shrink an image to fit a square box, leaving smaller images untouched
pub fn downscale_to_fit(image: &DynamicImage, max_dimension: u32) -> std::borrow::Cow<'_, DynamicImage> {
    let max_dimension = max_dimension.max(1);
    if image.width() > max_dimension || image.height() > max_dimension {
        let resized = image.resize(max_dimension, max_dimension, FilterType::Triangle);
        debug!(
            from_width = image.width(),
            from_height = image.height(),
            to_width = resized.width(),
            to_height = resized.height(),
            "Downscaled still image"
        );
        std::borrow::Cow::Owned(resized)
    } else {
        std::borrow::Cow::Borrowed(image)
    }
}

/// Rec. 601 luma from RGBA, alpha ignored
fn luma_from_rgba(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(4)
        .map(|px| {
            let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            ((r * 299 + g * 587 + b * 114) / 1000) as u8
        })
        .collect()
}

/// Try both polarities over a grayscale buffer
fn decode_luma(luma: &[u8], width: u32, height: u32) -> Detection {
    let start = std::time::Instant::now();

    for polarity in Polarity::ATTEMPT_ORDER {
        if let Some(detection) = decode_with_polarity(luma, width, height, polarity) {
            debug!(
                content = %detection.payload,
                ?polarity,
                decode_ms = start.elapsed().as_millis(),
                "Decoded QR code"
            );
            return Detection::Found(detection);
        }
    }

    trace!(
        width,
        height,
        decode_ms = start.elapsed().as_millis(),
        "No QR code found"
    );
    Detection::NotFound
}

fn decode_with_polarity(
    luma: &[u8],
    width: u32,
    height: u32,
    polarity: Polarity,
) -> Option<QrDetection> {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || luma.len() < w * h {
        return None;
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        let value = luma[y * w + x];
        match polarity {
            Polarity::Normal => value,
            Polarity::Inverted => 255 - value,
        }
    });

    for grid in prepared.detect_grids() {
        let content = match grid.decode() {
            Ok((_meta, content)) => content,
            Err(e) => {
                trace!(error = %e, ?polarity, "Found grid but failed to decode");
                continue;
            }
        };

        // Bounding box of the four symbol corners, clamped to the image
        let xs = grid.bounds.iter().map(|p| p.x.clamp(0, width as i32) as u32);
        let ys = grid.bounds.iter().map(|p| p.y.clamp(0, height as i32) as u32);
        let (min_x, max_x) = (xs.clone().min().unwrap_or(0), xs.max().unwrap_or(0));
        let (min_y, max_y) = (ys.clone().min().unwrap_or(0), ys.max().unwrap_or(0));
        let region =
            FrameRegion::from_pixels(min_x, min_y, max_x - min_x, max_y - min_y, width, height);

        return Some(QrDetection {
            payload: DecodedPayload::new(content),
            polarity,
            region,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{embed, invert, qr_gray};
    use image::GrayImage;

    fn rgba_of(gray: &GrayImage) -> Vec<u8> {
        DynamicImage::ImageLuma8(gray.clone()).to_rgba8().into_raw()
    }

    #[test]
    fn test_decodes_dark_on_light() {
        let gray = qr_gray("upi://pay?pa=test@bank", 6);
        let detection = QrDetector::new()
            .decode(&rgba_of(&gray), gray.width(), gray.height())
            .unwrap();
        match detection {
            Detection::Found(found) => {
                assert_eq!(found.payload.as_str(), "upi://pay?pa=test@bank");
                assert_eq!(found.polarity, Polarity::Normal);
                assert!(found.region.width > 0.5);
            }
            Detection::NotFound => panic!("expected a QR code"),
        }
    }

    #[test]
    fn test_decodes_light_on_dark() {
        let gray = invert(&qr_gray("inverted payload", 6));
        let detection = QrDetector::new()
            .decode(&rgba_of(&gray), gray.width(), gray.height())
            .unwrap();
        match detection {
            Detection::Found(found) => {
                assert_eq!(found.payload.as_str(), "inverted payload");
            }
            Detection::NotFound => panic!("expected an inverted QR code"),
        }
    }

    #[test]
    fn test_decode_is_idempotent_and_leaves_input_untouched() {
        let detector = QrDetector::new();
        for gray in [qr_gray("same twice", 5), invert(&qr_gray("same twice", 5))] {
            let pixels = rgba_of(&gray);
            let snapshot = pixels.clone();
            let first = detector.decode(&pixels, gray.width(), gray.height()).unwrap();
            let second = detector.decode(&pixels, gray.width(), gray.height()).unwrap();
            assert_eq!(first, second);
            assert_eq!(pixels, snapshot);
        }

        let blank = vec![255u8; 64 * 64 * 4];
        assert_eq!(detector.decode(&blank, 64, 64).unwrap(), Detection::NotFound);
        assert_eq!(detector.decode(&blank, 64, 64).unwrap(), Detection::NotFound);
    }

    #[test]
    fn test_buffer_mismatch_is_a_fault() {
        let result = QrDetector::new().decode(&[0u8; 10], 2, 2);
        assert_eq!(
            result,
            Err(FrameFault::BufferMismatch {
                expected: 16,
                actual: 10
            })
        );
    }

    #[test]
    fn test_downscale_preserves_aspect_ratio() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(3000, 1500));
        let scaled = downscale_to_fit(&image, 1200);
        assert_eq!((scaled.width(), scaled.height()), (1200, 600));

        let small = DynamicImage::ImageLuma8(GrayImage::new(400, 300));
        assert!(matches!(downscale_to_fit(&small, 1200), std::borrow::Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn test_still_image_large_photo_decodes_after_downscale() {
        let code = qr_gray("large photo", 10);
        let photo = embed(&code, 2400, 1800, 700, 500);
        let input = DecodeInput::Still {
            image: DynamicImage::ImageLuma8(photo),
            max_dimension: 1200,
        };
        let detection = decode_off_runtime(Arc::new(QrDetector::new()), input)
            .await
            .unwrap();
        assert_eq!(
            detection.into_payload(),
            Some(DecodedPayload::new("large photo"))
        );
    }

    #[tokio::test]
    async fn test_frame_decodes_off_runtime() {
        let gray = qr_gray("from camera", 4);
        let frame = CameraFrame::from_rgba(gray.width(), gray.height(), rgba_of(&gray), 0);
        let detection = decode_off_runtime(Arc::new(QrDetector::new()), DecodeInput::Frame(frame))
            .await
            .unwrap();
        assert!(detection.is_found());
    }

    struct Exploding;

    impl FrameDecoder for Exploding {
        fn decode(&self, _pixels: &[u8], _w: u32, _h: u32) -> Result<Detection, FrameFault> {
            panic!("decoder blew up")
        }
    }

    #[tokio::test]
    async fn test_decoder_panic_becomes_fault() {
        let input = DecodeInput::Still {
            image: DynamicImage::ImageLuma8(GrayImage::new(8, 8)),
            max_dimension: 1200,
        };
        let result = decode_off_runtime(Arc::new(Exploding), input).await;
        assert!(matches!(result, Err(FrameFault::DecoderPanicked(_))));
    }
}
