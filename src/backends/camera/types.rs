// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use crate::errors::CameraError;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, CameraError>;

/// Which camera to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFacing {
    /// Rear camera, pointed away from the user (the one that sees QR codes)
    #[default]
    Environment,
    /// Front camera
    User,
}

impl std::fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraFacing::Environment => write!(f, "environment"),
            CameraFacing::User => write!(f, "user"),
        }
    }
}

/// One RGBA frame grabbed from a camera stream
#[derive(Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// RGBA pixels, `stride` bytes per row
    pub data: Arc<[u8]>,
    /// Row stride in bytes (may include padding past `width * 4`)
    pub stride: u32,
    /// Position of the frame in its stream
    pub sequence: u64,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Wrap tightly packed RGBA pixels
    pub fn from_rgba(width: u32, height: u32, data: impl Into<Arc<[u8]>>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            stride: width * 4,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Pixels without stride padding
    ///
    /// Borrows when the frame is already tightly packed.
    pub fn packed_rgba(&self) -> Cow<'_, [u8]> {
        let width = self.width as usize;
        let height = self.height as usize;
        let stride = self.stride as usize;
        let row_bytes = width * 4;

        if stride == row_bytes {
            let end = (row_bytes * height).min(self.data.len());
            return Cow::Borrowed(&self.data[..end]);
        }

        let mut result = Vec::with_capacity(row_bytes * height);
        for y in 0..height {
            let row_start = y * stride;
            let row_end = row_start + row_bytes;
            if row_end <= self.data.len() {
                result.extend_from_slice(&self.data[row_start..row_end]);
            }
        }
        Cow::Owned(result)
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}
