// SPDX-License-Identifier: GPL-3.0-only

//! Input acquisition
//!
//! Turns a picked file or the live camera into exactly one decoded payload,
//! a manual-crop request, or a failure. The orchestrator is the only
//! component that decides what the user sees while an attempt runs.

pub mod orchestrator;
pub mod pacing;
pub mod preview;
pub mod state;

pub use orchestrator::AcquisitionOrchestrator;
pub use pacing::{paced, watchdog};
pub use preview::{PreviewRef, PreviewRegistry, PreviewUrl};
pub use state::{
    AcquisitionEvent, AcquisitionOutcome, AcquisitionState, AttemptId, CropTarget, FailureReason,
    ProcessingStage, UxSignal,
};
