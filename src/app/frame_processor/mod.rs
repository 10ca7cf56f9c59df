// SPDX-License-Identifier: GPL-3.0-only

//! QR decoding for still images and camera frames
//!
//! Both the upload path and the live camera loop hand RGBA pixels to a
//! [`FrameDecoder`]; the production implementation is
//! [`tasks::qr_detector::QrDetector`].

pub mod tasks;
pub mod types;

pub use tasks::qr_detector;
pub use types::{DecodedPayload, Detection, FrameDecoder, FrameRegion, Polarity, QrDetection};
