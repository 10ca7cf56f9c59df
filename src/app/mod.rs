// SPDX-License-Identifier: GPL-3.0-only

//! Application logic
//!
//! - [`acquisition`]: file/camera input to a single decoded payload
//! - [`frame_processor`]: QR decoding of stills and camera frames
//! - [`gallery`]: saved codes and the recycle bin
//! - [`expenses`]: amounts paid through exported cards
//! - [`notice`]: user-facing messages

pub mod acquisition;
pub mod expenses;
pub mod frame_processor;
pub mod gallery;
pub mod notice;

pub use acquisition::{AcquisitionOrchestrator, AcquisitionOutcome, AcquisitionState, UxSignal};
pub use notice::{Notice, NoticeKind};
