// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! ```text
//! ┌──────────────────────┐
//! │ Acquisition          │
//! │ Orchestrator         │
//! └──────────┬───────────┘
//!            │ open(Environment)
//!            ▼
//! ┌──────────────────────┐        ┌────────────────┐
//! │  CameraBackend Trait │ ─────▶ │ CameraStream   │ ◀── frame_loop
//! └──────────┬───────────┘        └────────────────┘     (one frame per
//!            │                                            display refresh)
//!            ▼
//!     ┌──────────────┐
//!     │VirtualCamera │  ← Concrete implementation
//!     └──────────────┘
//! ```
//!
//! A backend hands out at most one stream per `open` call. The stream owns
//! the hardware tracks; [`CameraStream::stop_tracks`] releases them and must
//! be safe to call more than once.

pub mod frame_loop;
pub mod types;

pub use frame_loop::{FrameClock, IntervalClock, ScanEnd, ScanSession, ScanStats};
pub use types::*;

use crate::errors::FrameFault;
use futures::future::BoxFuture;

/// A source of camera streams
pub trait CameraBackend: Send + Sync {
    /// Ask for a stream from the camera facing `facing`
    ///
    /// This is where a permission prompt would appear. Refusal or missing
    /// hardware is reported as an error and nothing stays allocated.
    fn open(&self, facing: CameraFacing) -> BoxFuture<'_, BackendResult<Box<dyn CameraStream>>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// A live, playing camera stream
pub trait CameraStream: Send {
    /// Native frame resolution
    fn resolution(&self) -> (u32, u32);

    /// Whether the stream is still delivering frames
    ///
    /// Once this returns false the scan loop exits.
    fn is_playing(&self) -> bool;

    /// Grab the current frame
    ///
    /// `Ok(None)` means the stream has no new data yet; the loop just waits
    /// for the next display refresh.
    fn current_frame(&mut self) -> Result<Option<CameraFrame>, FrameFault>;

    /// Stop all hardware tracks. Idempotent.
    fn stop_tracks(&mut self);
}

/// Backend used when nothing is configured: every open fails
#[derive(Debug, Default)]
pub struct NoCamera;

impl CameraBackend for NoCamera {
    fn open(&self, _facing: CameraFacing) -> BoxFuture<'_, BackendResult<Box<dyn CameraStream>>> {
        Box::pin(async { Err(crate::errors::CameraError::NoCameraFound) })
    }

    fn name(&self) -> &str {
        "none"
    }
}
