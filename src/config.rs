// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as a JSON document under the platform config directory. Every field
//! has a default so older or hand-edited files keep loading.

use crate::constants::{EncodeQuality, decode, timing};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum time a still/crop decode keeps the scanning state visible
    pub min_scan_duration_ms: u64,
    /// How long the success confirmation is shown
    pub success_confirm_ms: u64,
    /// Still images are downscaled to fit this box before decoding
    pub max_decode_dimension: u32,
    /// JPEG quality for transcoded HEIF uploads
    pub heif_jpeg_quality: u8,
    /// JPEG quality for cropped regions
    pub crop_jpeg_quality: u8,
    /// Display refresh rate driving the camera scan loop
    pub camera_frame_rate: u32,
    /// Auto-dismiss interval for transient error notices
    pub transient_error_ms: u64,
    /// Abort a still/crop decode after this long (unset = wait forever)
    pub decode_timeout_ms: Option<u64>,
    /// Override for the gallery/expense storage directory
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_scan_duration_ms: timing::MIN_SCAN_DURATION.as_millis() as u64,
            success_confirm_ms: timing::SUCCESS_CONFIRM_DURATION.as_millis() as u64,
            max_decode_dimension: decode::MAX_STILL_DIMENSION,
            heif_jpeg_quality: EncodeQuality::Transcode.jpeg_quality(),
            crop_jpeg_quality: EncodeQuality::Crop.jpeg_quality(),
            camera_frame_rate: timing::DEFAULT_FRAME_RATE,
            transient_error_ms: timing::TRANSIENT_ERROR_DURATION.as_millis() as u64,
            decode_timeout_ms: None,
            data_dir: None,
        }
    }
}

/// Acquisition-pipeline view of the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub min_scan_duration: Duration,
    pub success_confirm: Duration,
    pub max_decode_dimension: u32,
    pub heif_jpeg_quality: u8,
    pub crop_jpeg_quality: u8,
    pub frame_rate: u32,
    pub transient_error: Duration,
    pub decode_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Config::default().pipeline_settings()
    }
}

impl Config {
    /// Default location: `<config_dir>/qsend/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("qsend").join("config.json"))
    }

    /// Load configuration from a file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
            Self::default()
        })
    }

    /// Persist configuration, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Directory holding the gallery and expense documents
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("qsend")
        })
    }

    /// Directory for preview handles handed to the crop UI
    pub fn preview_dir(&self) -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("qsend")
            .join("previews")
    }

    /// Settings consumed by the acquisition orchestrator
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            min_scan_duration: Duration::from_millis(self.min_scan_duration_ms),
            success_confirm: Duration::from_millis(self.success_confirm_ms),
            max_decode_dimension: self.max_decode_dimension.max(1),
            heif_jpeg_quality: self.heif_jpeg_quality.clamp(1, 100),
            crop_jpeg_quality: self.crop_jpeg_quality.clamp(1, 100),
            frame_rate: self.camera_frame_rate.max(1),
            transient_error: Duration::from_millis(self.transient_error_ms),
            decode_timeout: self.decode_timeout_ms.map(Duration::from_millis),
        }
    }
}
