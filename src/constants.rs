// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// JPEG quality presets used when the pipeline re-encodes an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodeQuality {
    /// Transcoded HEIF uploads: small enough to keep decode fast
    #[default]
    Transcode,
    /// Cropped regions: keep as much detail as possible for the retry
    Crop,
}

impl EncodeQuality {
    /// Get all presets for iteration
    pub const ALL: [EncodeQuality; 2] = [EncodeQuality::Transcode, EncodeQuality::Crop];

    /// JPEG quality value (0-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodeQuality::Transcode => 80,
            EncodeQuality::Crop => 95,
        }
    }
}

/// Pacing of the acquisition UI
pub mod timing {
    use super::Duration;

    /// Floor on how quickly a still-image or crop decode may resolve
    pub const MIN_SCAN_DURATION: Duration = Duration::from_millis(800);

    /// How long the "decoded" confirmation is shown before handing off
    pub const SUCCESS_CONFIRM_DURATION: Duration = Duration::from_millis(600);

    /// Transient error notices disappear after this long
    pub const TRANSIENT_ERROR_DURATION: Duration = Duration::from_millis(4000);

    /// Display refresh rate the camera scan loop is driven at
    pub const DEFAULT_FRAME_RATE: u32 = 60;

    /// Log scan loop progress every N frames
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// Decoder limits
pub mod decode {
    /// Still images are downscaled to fit this box before decoding
    pub const MAX_STILL_DIMENSION: u32 = 1200;

    /// Largest crop canvas, in pixels, the crop resolver will allocate
    pub const MAX_CROP_PIXELS: u64 = 40_000_000;
}

/// Persistence keys (one JSON document per key)
pub mod storage_keys {
    /// Saved QR codes, including soft-deleted ones
    pub const VAULT: &str = "qsend_vault_v1";

    /// Expense ledger
    pub const EXPENSES: &str = "qsend_expenses_v1";
}

/// Card export
pub mod card {
    /// File name used for shared/exported cards
    pub const EXPORT_FILE_NAME: &str = "qsend-payment.png";

    /// Edge length of the rendered card in pixels
    pub const DEFAULT_SIZE: u32 = 800;

    /// Fraction of the card edge occupied by the QR symbol
    pub const QR_FRACTION: f32 = 0.7;

    /// Label used when a record is saved from the editor without one
    pub const DEFAULT_SAVE_LABEL: &str = "Saved Payment QR";

    /// Label used for expenses when nothing better is known
    pub const DEFAULT_EXPENSE_LABEL: &str = "Payment";

    /// Card title when the code has no label
    pub const DEFAULT_TITLE: &str = "PAYMENT QR";

    /// Caption above the printed amount
    pub const AMOUNT_CAPTION: &str = "TOTAL AMOUNT";

    /// Hint printed instead of an amount
    pub const NO_AMOUNT_CAPTION: &str = "Scan & Pay";

    /// Prefix of the printed amount
    pub const CURRENCY_SYMBOL: &str = "₹";
}

/// Supported file formats
pub mod file_formats {
    /// Image file extensions decoded natively
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Extensions of HEIF containers that need transcoding
    pub const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

    /// MIME types of HEIF containers
    pub const HEIF_MIME_TYPES: &[&str] = &["image/heic", "image/heif"];

    /// Check if extension is a natively decoded image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// Check if extension is a HEIF container
    pub fn is_heif_extension(ext: &str) -> bool {
        HEIF_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// Check if a MIME type denotes a HEIF container
    pub fn is_heif_mime(mime: &str) -> bool {
        HEIF_MIME_TYPES.contains(&mime.trim().to_lowercase().as_str())
    }

    /// Best-effort MIME type for a file extension
    ///
    /// HEIF containers are not an `image` format, everything else is looked
    /// up there.
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_lowercase().as_str() {
            "heic" => Some("image/heic"),
            "heif" => Some("image/heif"),
            other => image::ImageFormat::from_extension(other).map(|f| f.to_mime_type()),
        }
    }
}
