// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backend
//!
//! Replays a scripted sequence of frames as if they came from a camera.
//! Used by the `camera` CLI command (frames loaded from image files) and by
//! tests, which can also script "not ready" frames, capture faults and a
//! permission refusal.

mod file_source;

pub use file_source::{collect_image_paths, load_frames, load_image_as_frame};

use crate::backends::camera::types::{BackendResult, CameraFacing, CameraFrame};
use crate::backends::camera::{CameraBackend, CameraStream};
use crate::errors::{CameraError, FrameFault};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// One step of a virtual camera script
#[derive(Debug, Clone)]
pub enum VirtualFrame {
    /// Deliver this frame
    Image(CameraFrame),
    /// The stream has no data for this refresh
    NotReady,
    /// Capturing this frame fails
    Fault(String),
}

/// Opened/stopped track counts, shared by all streams of one backend
#[derive(Debug, Default)]
struct TrackLedger {
    opened: AtomicUsize,
    stopped: AtomicUsize,
}

/// File- or script-backed camera backend
pub struct VirtualCamera {
    script: Arc<Vec<VirtualFrame>>,
    looping: bool,
    deny: bool,
    open_delay: Option<Duration>,
    ledger: Arc<TrackLedger>,
}

impl VirtualCamera {
    /// Replay frames once, then end the stream
    pub fn from_frames(frames: Vec<CameraFrame>) -> Self {
        Self::scripted(frames.into_iter().map(VirtualFrame::Image).collect())
    }

    /// Replay an arbitrary script
    pub fn scripted(script: Vec<VirtualFrame>) -> Self {
        Self {
            script: Arc::new(script),
            looping: false,
            deny: false,
            open_delay: None,
            ledger: Arc::new(TrackLedger::default()),
        }
    }

    /// A camera whose permission prompt is always refused
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::scripted(Vec::new())
        }
    }

    /// Restart the script after the last step instead of ending
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Simulate a slow permission prompt
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Streams opened so far
    pub fn streams_opened(&self) -> usize {
        self.ledger.opened.load(Ordering::SeqCst)
    }

    /// Streams whose tracks are still live
    pub fn live_tracks(&self) -> usize {
        self.ledger.opened.load(Ordering::SeqCst) - self.ledger.stopped.load(Ordering::SeqCst)
    }
}

impl CameraBackend for VirtualCamera {
    fn open(&self, facing: CameraFacing) -> BoxFuture<'_, BackendResult<Box<dyn CameraStream>>> {
        Box::pin(async move {
            if let Some(delay) = self.open_delay {
                tokio::time::sleep(delay).await;
            }
            if self.deny {
                info!(%facing, "Virtual camera refused permission");
                return Err(CameraError::PermissionDenied);
            }
            if self.script.is_empty() {
                return Err(CameraError::NoCameraFound);
            }

            self.ledger.opened.fetch_add(1, Ordering::SeqCst);
            debug!(%facing, steps = self.script.len(), "Virtual camera stream opened");
            let stream: Box<dyn CameraStream> = Box::new(VirtualStream {
                script: Arc::clone(&self.script),
                next: 0,
                looping: self.looping,
                stopped: false,
                ledger: Arc::clone(&self.ledger),
            });
            Ok(stream)
        })
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

struct VirtualStream {
    script: Arc<Vec<VirtualFrame>>,
    next: usize,
    looping: bool,
    stopped: bool,
    ledger: Arc<TrackLedger>,
}

impl CameraStream for VirtualStream {
    fn resolution(&self) -> (u32, u32) {
        self.script
            .iter()
            .find_map(|step| match step {
                VirtualFrame::Image(frame) => Some((frame.width, frame.height)),
                _ => None,
            })
            .unwrap_or((0, 0))
    }

    fn is_playing(&self) -> bool {
        !self.stopped && (self.looping || self.next < self.script.len())
    }

    fn current_frame(&mut self) -> Result<Option<CameraFrame>, FrameFault> {
        if self.script.is_empty() {
            return Ok(None);
        }
        let step = &self.script[self.next % self.script.len()];
        self.next += 1;
        match step {
            VirtualFrame::Image(frame) => {
                let mut frame = frame.clone();
                frame.sequence = self.next as u64 - 1;
                frame.captured_at = std::time::Instant::now();
                Ok(Some(frame))
            }
            VirtualFrame::NotReady => Ok(None),
            VirtualFrame::Fault(msg) => Err(FrameFault::Capture(msg.clone())),
        }
    }

    fn stop_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.ledger.stopped.fetch_add(1, Ordering::SeqCst);
            debug!("Virtual camera tracks stopped");
        }
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
