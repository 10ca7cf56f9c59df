// SPDX-License-Identifier: GPL-3.0-only
//! Cooperative camera scan loop
//!
//! One frame is captured per display refresh and handed to the QR decoder.
//! The next frame is not captured until the previous decode has returned, so
//! a slow decode naturally lowers the scan rate instead of queueing frames.
//!
//! Per-frame failures (capture faults, decoder panics, "not found") never end
//! the loop. It ends only when a code is decoded, the stream stops playing,
//! or the session is stopped.

use super::{CameraStream, types::CameraFrame};
use crate::app::frame_processor::qr_detector::{DecodeInput, decode_off_runtime};
use crate::app::frame_processor::{Detection, FrameDecoder, QrDetection};
use crate::constants::timing;
use crate::errors::FrameFault;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Display refresh signal driving the scan loop
pub trait FrameClock: Send {
    /// Resolve at the next refresh
    fn next_frame(&mut self) -> BoxFuture<'_, ()>;
}

/// Refresh clock at a fixed frame rate
///
/// Missed ticks are delayed rather than bursted, so a long decode does not
/// cause a catch-up flood of frames afterwards. Must be created inside a
/// Tokio runtime.
pub struct IntervalClock {
    interval: tokio::time::Interval,
}

impl IntervalClock {
    pub fn new(frame_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl FrameClock for IntervalClock {
    fn next_frame(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.interval.tick().await;
        })
    }
}

/// Why a scan loop ended on its own
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEnd {
    /// A QR code was decoded; the stream has already been stopped
    Decoded(QrDetection),
    /// The stream stopped playing before anything was decoded
    StreamEnded,
}

/// Counters describing a scan loop's progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Frames handed to the decoder
    pub frames: u64,
    /// Frames decoded with no QR code in them
    pub misses: u64,
    /// Frames lost to capture or decoder faults
    pub faults: u64,
}

#[derive(Default)]
struct ScanCounters {
    frames: AtomicU64,
    misses: AtomicU64,
    faults: AtomicU64,
}

/// Owns the stream so that its tracks are stopped exactly once
struct StreamSlot {
    stream: Mutex<Option<Box<dyn CameraStream>>>,
}

impl StreamSlot {
    fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Stop the tracks if they are still live; returns whether this call did it
    fn release(&self) -> bool {
        let taken = self
            .stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match taken {
            Some(mut stream) => {
                stream.stop_tracks();
                true
            }
            None => false,
        }
    }

    fn is_live(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

enum Grab {
    Frame(CameraFrame),
    NotReady,
    Fault(FrameFault),
    Ended,
    Released,
}

/// A running camera scan
///
/// Dropping the session stops it.
pub struct ScanSession {
    stop_signal: Arc<AtomicBool>,
    slot: Arc<StreamSlot>,
    counters: Arc<ScanCounters>,
    task: Option<JoinHandle<()>>,
}

impl ScanSession {
    /// Start scanning `stream`
    ///
    /// The receiver resolves when the loop ends on its own. If the session is
    /// stopped first, the sender is dropped and the receiver reports an error.
    pub fn start(
        stream: Box<dyn CameraStream>,
        decoder: Arc<dyn FrameDecoder>,
        clock: Box<dyn FrameClock>,
    ) -> (Self, oneshot::Receiver<ScanEnd>) {
        let (width, height) = stream.resolution();
        info!(width, height, "Starting camera scan loop");

        let stop_signal = Arc::new(AtomicBool::new(false));
        let slot = Arc::new(StreamSlot::new(stream));
        let counters = Arc::new(ScanCounters::default());
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(run_scan_loop(
            Arc::clone(&slot),
            decoder,
            clock,
            Arc::clone(&stop_signal),
            Arc::clone(&counters),
            tx,
        ));

        let session = Self {
            stop_signal,
            slot,
            counters,
            task: Some(task),
        };
        (session, rx)
    }

    /// Whether the loop is still scheduling frames
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished()) && self.slot.is_live()
    }

    /// Whether the stream's tracks are still live
    pub fn has_live_stream(&self) -> bool {
        self.slot.is_live()
    }

    /// Stop scanning: cancel the pending frame and stop all tracks
    ///
    /// Safe to call any number of times, including after the loop ended on
    /// its own.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.slot.release() {
            info!("Camera scan stopped, tracks released");
        }
    }

    pub fn stats(&self) -> ScanStats {
        ScanStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            faults: self.counters.faults.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_scan_loop(
    slot: Arc<StreamSlot>,
    decoder: Arc<dyn FrameDecoder>,
    mut clock: Box<dyn FrameClock>,
    stop_signal: Arc<AtomicBool>,
    counters: Arc<ScanCounters>,
    tx: oneshot::Sender<ScanEnd>,
) {
    debug!("Scan loop started");

    loop {
        clock.next_frame().await;
        if stop_signal.load(Ordering::SeqCst) {
            debug!("Stop signal received");
            return;
        }

        let frame = match grab_frame(&slot) {
            Grab::Frame(frame) => frame,
            Grab::NotReady => continue,
            Grab::Fault(fault) => {
                counters.faults.fetch_add(1, Ordering::Relaxed);
                warn!(error = %fault, "Ignoring frame capture fault");
                continue;
            }
            Grab::Released => return,
            Grab::Ended => {
                info!("Camera stream ended before a code was found");
                slot.release();
                let _ = tx.send(ScanEnd::StreamEnded);
                return;
            }
        };

        let count = counters.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frames = count, sequence = frame.sequence, "Scan loop progress");
        }

        match decode_off_runtime(Arc::clone(&decoder), DecodeInput::Frame(frame)).await {
            Ok(Detection::Found(detection)) => {
                if stop_signal.load(Ordering::SeqCst) {
                    return;
                }
                info!(frames = count, content = %detection.payload, "Camera scan decoded a QR code");
                slot.release();
                let _ = tx.send(ScanEnd::Decoded(detection));
                return;
            }
            Ok(Detection::NotFound) => {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                trace!(frame = count, "No QR code in frame");
            }
            Err(fault) => {
                counters.faults.fetch_add(1, Ordering::Relaxed);
                warn!(frame = count, error = %fault, "Ignoring frame decode fault");
            }
        }
    }
}

fn grab_frame(slot: &StreamSlot) -> Grab {
    let mut guard = slot.stream.lock().unwrap_or_else(|e| e.into_inner());
    let Some(stream) = guard.as_mut() else {
        return Grab::Released;
    };
    if !stream.is_playing() {
        return Grab::Ended;
    }
    match stream.current_frame() {
        Ok(Some(frame)) => Grab::Frame(frame),
        Ok(None) => Grab::NotReady,
        Err(fault) => Grab::Fault(fault),
    }
}
