// SPDX-License-Identifier: GPL-3.0-only

//! Image normalizer
//!
//! Turns an arbitrary picked file into bytes the raster decoder can read.
//! Everything except HEIF passes through untouched; HEIF containers are
//! transcoded to JPEG and the first embedded image wins.

use crate::constants::file_formats;
use crate::errors::NormalizeError;
use crate::media::heif::{self, HeifTranscoder};
use crate::media::source::{ImageBlob, SourceFile};
use image::codecs::jpeg::JpegEncoder;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fallback MIME type when neither the picker nor the bytes tell us
const UNKNOWN_MIME: &str = "application/octet-stream";

pub struct ImageNormalizer {
    transcoder: Option<Arc<dyn HeifTranscoder>>,
    jpeg_quality: u8,
}

impl ImageNormalizer {
    /// Create a normalizer using the HEIF support compiled into this build
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            transcoder: heif::default_transcoder(),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Replace the HEIF transcoder
    pub fn with_transcoder(mut self, transcoder: Arc<dyn HeifTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Build a normalizer with no HEIF support at all
    pub fn without_heif(jpeg_quality: u8) -> Self {
        Self {
            transcoder: None,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Whether the file is a HEIF container
    ///
    /// Checks the declared MIME type and the extension; either is enough,
    /// since some pickers report HEIC photos as `image/jpeg` or not at all.
    pub fn is_heif(file: &SourceFile) -> bool {
        file.mime().is_some_and(file_formats::is_heif_mime)
            || file
                .extension()
                .is_some_and(|ext| file_formats::is_heif_extension(&ext))
    }

    /// Normalize a picked file into a decodable image blob
    ///
    /// Never mutates `file`. Non-HEIF inputs share the same byte buffer.
    pub async fn normalize(&self, file: &SourceFile) -> Result<ImageBlob, NormalizeError> {
        if !Self::is_heif(file) {
            let mime = file
                .mime()
                .map(str::to_string)
                .or_else(|| {
                    image::guess_format(file.bytes())
                        .ok()
                        .map(|f| f.to_mime_type().to_string())
                })
                .unwrap_or_else(|| UNKNOWN_MIME.to_string());
            debug!(name = file.name(), mime = %mime, "Passing image through unchanged");
            return Ok(ImageBlob::new(mime, Arc::clone(file.bytes())));
        }

        let Some(transcoder) = self.transcoder.clone() else {
            warn!(name = file.name(), "HEIF upload but no transcoder available");
            return Err(NormalizeError::UnsupportedFormat(
                "HEIC/HEIF support is not available in this build".to_string(),
            ));
        };

        info!(name = file.name(), bytes = file.bytes().len(), "Transcoding HEIF upload");
        let bytes = Arc::clone(file.bytes());
        let quality = self.jpeg_quality;

        let jpeg = tokio::task::spawn_blocking(move || transcode_first(&*transcoder, &bytes, quality))
            .await
            .map_err(|e| NormalizeError::TranscodeFailed(format!("transcode task failed: {}", e)))??;

        debug!(bytes = jpeg.len(), "HEIF transcoded to JPEG");
        Ok(ImageBlob::new("image/jpeg", jpeg))
    }
}

/// Decode the container and re-encode its first image as JPEG
fn transcode_first(
    transcoder: &dyn HeifTranscoder,
    bytes: &[u8],
    quality: u8,
) -> Result<Vec<u8>, NormalizeError> {
    let images = transcoder.decode_all(bytes).map_err(|e| {
        warn!(error = %e, "HEIF conversion failed");
        NormalizeError::TranscodeFailed(e)
    })?;

    if images.len() > 1 {
        debug!(images = images.len(), "HEIF container holds several images, using the first");
    }
    let first = images
        .into_iter()
        .next()
        .ok_or_else(|| NormalizeError::TranscodeFailed("container holds no images".to_string()))?;

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&first)
        .map_err(|e| NormalizeError::TranscodeFailed(e.to_string()))?;
    Ok(out)
}
