// SPDX-License-Identifier: GPL-3.0-only

//! Core types for QR decode results
//!
//! A decode either finds a payload or reports [`Detection::NotFound`]; the
//! latter is the common case and is not an error.

use crate::errors::FrameFault;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw text content of a QR symbol
///
/// Immutable once produced: there are no mutating accessors, and it is
/// handed to the save/editor flow by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecodedPayload(String);

impl DecodedPayload {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DecodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the symbol was rendered relative to its background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Dark modules on a light background (printed codes)
    Normal,
    /// Light modules on a dark background (dark-mode screens)
    Inverted,
}

impl Polarity {
    /// Order in which polarities are attempted
    pub const ATTEMPT_ORDER: [Polarity; 2] = [Polarity::Normal, Polarity::Inverted];
}

/// A rectangular region within a frame
///
/// Coordinates are normalized (0.0 to 1.0) relative to the frame dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRegion {
    /// Left edge (0.0 = left of frame, 1.0 = right of frame)
    pub x: f32,
    /// Top edge (0.0 = top of frame, 1.0 = bottom of frame)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl FrameRegion {
    /// Create a frame region from pixel coordinates
    pub fn from_pixels(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        let fw = frame_width.max(1) as f32;
        let fh = frame_height.max(1) as f32;
        Self {
            x: x as f32 / fw,
            y: y as f32 / fh,
            width: width as f32 / fw,
            height: height as f32 / fh,
        }
    }
}

/// A decoded QR symbol
#[derive(Debug, Clone, PartialEq)]
pub struct QrDetection {
    /// Decoded content
    pub payload: DecodedPayload,
    /// Polarity the symbol was found under
    pub polarity: Polarity,
    /// Where the symbol sits in the decoded image
    pub region: FrameRegion,
}

/// Result of one decode call
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Found(QrDetection),
    NotFound,
}

impl Detection {
    /// The payload, if a symbol was decoded
    pub fn into_payload(self) -> Option<DecodedPayload> {
        match self {
            Detection::Found(detection) => Some(detection.payload),
            Detection::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Detection::Found(_))
    }
}

/// Anything that can look for a QR symbol in an RGBA pixel buffer
///
/// Implementations must be pure: same input, same result, input untouched.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, pixels: &[u8], width: u32, height: u32) -> Result<Detection, FrameFault>;
}
