// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the QR acquisition pipeline and its collaborators
//!
//! Each pipeline stage owns one error enum. Only some of them ever reach the
//! user: a [`FrameFault`] is always recovered inside the scan loop and a
//! "not found" decode is a normal branch, not an error at all.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Input could not be turned into a decodable raster
    Normalize(NormalizeError),
    /// Camera unavailable or refused
    Camera(CameraError),
    /// Crop rasterization failed
    Crop(CropError),
    /// Preview handle could not be allocated
    Resource(ResourceError),
    /// Persistent store failure
    Storage(StorageError),
    /// Card export failed
    Share(ShareError),
    /// Configuration errors
    Config(ConfigError),
    /// Operation not valid in the current acquisition state
    InvalidState(&'static str),
    /// Generic error with message
    Other(String),
}

/// Image normalization errors (format errors)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The input is not an image format we can read or transcode
    UnsupportedFormat(String),
    /// HEIF transcoding failed part way
    TranscodeFailed(String),
}

/// Faults raised while handling a single camera frame or decode call
///
/// These are ignorable by contract: the scan loop logs them and moves on
/// to the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameFault {
    /// Pixel buffer length does not match the stated dimensions
    BufferMismatch { expected: usize, actual: usize },
    /// The decoder panicked on this frame
    DecoderPanicked(String),
    /// The stream could not deliver the current frame
    Capture(String),
}

/// Camera-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// The user or the platform refused camera access
    PermissionDenied,
    /// No camera devices found
    NoCameraFound,
    /// Camera initialization failed
    InitializationFailed(String),
    /// The stream stopped delivering frames before a code was found
    StreamEnded,
}

/// Crop rasterization errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    /// Region has a zero width or height
    EmptyRegion,
    /// Region would need a larger canvas than the crop limit allows
    RegionTooLarge { width: u32, height: u32 },
    /// The source image could not be loaded
    SourceUnreadable(String),
    /// Encoding the cropped raster failed
    EncodingFailed(String),
}

/// Preview (object URL) allocation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Could not create or write the preview handle
    AllocationFailed(String),
}

/// Card export / share errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareError {
    /// The payload does not fit in a QR symbol at the export error level
    Encode(String),
    /// Background image could not be loaded
    Background(String),
    /// Writing the exported image failed
    Io(String),
}

/// Key-value store errors
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Filesystem failure
    Io(String),
    /// Value could not be serialized
    Serialize(String),
    /// Record with this id does not exist
    NotFound(String),
    /// Rejected input (e.g. empty label)
    Invalid(String),
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Config file could not be read or written
    Io(String),
    /// Config file is not valid JSON for [`crate::config::Config`]
    Parse(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Normalize(e) => write!(f, "Image error: {}", e),
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Crop(e) => write!(f, "Crop error: {}", e),
            AppError::Resource(e) => write!(f, "Resource error: {}", e),
            AppError::Storage(e) => write!(f, "Storage error: {}", e),
            AppError::Share(e) => write!(f, "Sharing failed: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::InvalidState(state) => write!(f, "Not allowed while {}", state),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            NormalizeError::TranscodeFailed(msg) => write!(f, "Unable to process HEIC image: {}", msg),
        }
    }
}

impl fmt::Display for FrameFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameFault::BufferMismatch { expected, actual } => write!(
                f,
                "Pixel buffer has {} bytes, expected {}",
                actual, expected
            ),
            FrameFault::DecoderPanicked(msg) => write!(f, "Decoder panicked: {}", msg),
            FrameFault::Capture(msg) => write!(f, "Frame capture failed: {}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::PermissionDenied => write!(f, "Camera permission denied"),
            CameraError::NoCameraFound => write!(f, "No camera devices found"),
            CameraError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            CameraError::StreamEnded => write!(f, "Camera stream ended"),
        }
    }
}

impl fmt::Display for CropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CropError::EmptyRegion => write!(f, "Crop region is empty"),
            CropError::RegionTooLarge { width, height } => {
                write!(f, "Crop region {}x{} is too large", width, height)
            }
            CropError::SourceUnreadable(msg) => write!(f, "Failed to load image: {}", msg),
            CropError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::AllocationFailed(msg) => {
                write!(f, "Failed to load image for alignment: {}", msg)
            }
        }
    }
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::Encode(msg) => write!(f, "QR encoding failed: {}", msg),
            ShareError::Background(msg) => write!(f, "Background image unusable: {}", msg),
            ShareError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "I/O error: {}", msg),
            StorageError::Serialize(msg) => write!(f, "Serialization failed: {}", msg),
            StorageError::NotFound(id) => write!(f, "No saved QR with id {}", id),
            StorageError::Invalid(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for NormalizeError {}
impl std::error::Error for FrameFault {}
impl std::error::Error for CameraError {}
impl std::error::Error for CropError {}
impl std::error::Error for ResourceError {}
impl std::error::Error for ShareError {}
impl std::error::Error for StorageError {}
impl std::error::Error for ConfigError {}

// Conversions from sub-errors to AppError
impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError::Normalize(err)
    }
}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<CropError> for AppError {
    fn from(err: CropError) -> Self {
        AppError::Crop(err)
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        AppError::Resource(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<ShareError> for AppError {
    fn from(err: ShareError) -> Self {
        AppError::Share(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

// Conversions for I/O and serde errors
impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialize(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ShareError {
    fn from(err: std::io::Error) -> Self {
        ShareError::Io(err.to_string())
    }
}

impl From<image::ImageError> for CropError {
    fn from(err: image::ImageError) -> Self {
        CropError::EncodingFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_errors_fold_into_app_error() {
        let err: AppError = CameraError::PermissionDenied.into();
        assert!(matches!(err, AppError::Camera(CameraError::PermissionDenied)));
        assert_eq!(err.to_string(), "Camera error: Camera permission denied");
    }

    #[test]
    fn test_frame_fault_display() {
        let fault = FrameFault::BufferMismatch {
            expected: 16,
            actual: 12,
        };
        assert_eq!(fault.to_string(), "Pixel buffer has 12 bytes, expected 16");
    }
}
