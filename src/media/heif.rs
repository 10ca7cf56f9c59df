// SPDX-License-Identifier: GPL-3.0-only

//! HEIF container decoding
//!
//! HEIC photos (the iPhone default) are not readable by the `image` crate.
//! The normalizer goes through the [`HeifTranscoder`] seam; the libheif
//! implementation is only compiled with the `heif` feature.

use image::RgbImage;
use std::sync::Arc;

/// Decodes the images stored in a HEIF container
pub trait HeifTranscoder: Send + Sync {
    /// Decode every top-level image, in container order
    ///
    /// Burst and live-photo containers hold more than one image; callers
    /// pick what they need from the returned list.
    fn decode_all(&self, bytes: &[u8]) -> Result<Vec<RgbImage>, String>;
}

/// The transcoder available in this build, if any
pub fn default_transcoder() -> Option<Arc<dyn HeifTranscoder>> {
    #[cfg(feature = "heif")]
    {
        Some(Arc::new(libheif::LibHeifTranscoder))
    }
    #[cfg(not(feature = "heif"))]
    {
        None
    }
}

#[cfg(feature = "heif")]
mod libheif {
    use super::HeifTranscoder;
    use image::RgbImage;
    use libheif_rs::{ColorSpace, HeifContext, ItemId, LibHeif, RgbChroma};
    use tracing::debug;

    /// HEIF decoding through the system libheif
    pub struct LibHeifTranscoder;

    impl HeifTranscoder for LibHeifTranscoder {
        fn decode_all(&self, bytes: &[u8]) -> Result<Vec<RgbImage>, String> {
            let lib = LibHeif::new();
            let ctx = HeifContext::read_from_bytes(bytes).map_err(|e| e.to_string())?;

            let count = ctx.number_of_top_level_images();
            let mut ids: Vec<ItemId> = vec![0; count];
            let found = ctx.top_level_image_ids(&mut ids);
            ids.truncate(found);
            debug!(images = found, "Decoding HEIF container");

            let mut images = Vec::with_capacity(found);
            for id in ids {
                let handle = ctx.image_handle(id).map_err(|e| e.to_string())?;
                let decoded = lib
                    .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
                    .map_err(|e| e.to_string())?;
                let planes = decoded.planes();
                let plane = planes
                    .interleaved
                    .ok_or_else(|| "decoded HEIF image has no interleaved plane".to_string())?;

                // Rows may carry padding past width * 3
                let width = plane.width as usize;
                let stride = plane.stride;
                let mut rgb = Vec::with_capacity(width * 3 * plane.height as usize);
                for row in plane.data.chunks(stride).take(plane.height as usize) {
                    rgb.extend_from_slice(&row[..width * 3]);
                }
                let image = RgbImage::from_raw(plane.width, plane.height, rgb)
                    .ok_or_else(|| "HEIF plane size mismatch".to_string())?;
                images.push(image);
            }
            Ok(images)
        }
    }
}
