// SPDX-License-Identifier: GPL-3.0-only

//! Acquisition state machine
//!
//! ```text
//!            file ─▶ Processing(Normalizing) ─▶ Processing(Decoding) ─┬─▶ Confirming ─▶ Resolved
//!  Idle ─┤                                                            └─▶ ManualCrop ◀─┐
//!            camera ─▶ Scanning ─▶ Confirming                                 │         │ miss
//!                                                                             ▼         │
//!                                                              Processing(CropRetry) ───┘
//! ```
//!
//! [`transition`] is a pure reducer: it never touches resources. The
//! orchestrator applies it and releases resources at every boundary.

use crate::app::frame_processor::DecodedPayload;
use crate::errors::{CameraError, NormalizeError, ResourceError};
use crate::media::RawImageSource;
use crate::pipelines::crop::CropRegion;
use std::fmt;

/// Identity of one acquisition attempt
///
/// Results carrying an older identity than the current one are stale and
/// get discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AttemptId(pub u64);

impl AttemptId {
    pub fn next(self) -> Self {
        AttemptId(self.0 + 1)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Image presented to the user for manual cropping
#[derive(Debug, Clone)]
pub struct CropTarget {
    /// The preview backing the crop view
    pub source: RawImageSource,
    /// Source image width in pixels
    pub width: u32,
    /// Source image height in pixels
    pub height: u32,
}

impl CropTarget {
    /// A crop covering the whole image
    pub fn full_region(&self) -> CropRegion {
        CropRegion::new(0, 0, self.width, self.height)
    }
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The file could not be normalized or read
    Format(NormalizeError),
    /// Camera access refused or no camera present
    PermissionDenied(CameraError),
    /// The camera stream ended before a code was found
    Camera(CameraError),
    /// The crop preview could not be allocated
    Resource(ResourceError),
    /// Decoding exceeded the configured watchdog
    Timeout,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Format(e) => write!(f, "{}", e),
            FailureReason::PermissionDenied(e) => write!(f, "{}", e),
            FailureReason::Camera(e) => write!(f, "{}", e),
            FailureReason::Resource(e) => write!(f, "{}", e),
            FailureReason::Timeout => write!(f, "Decoding timed out"),
        }
    }
}

/// Result of one acquisition attempt
#[derive(Debug, Clone)]
pub enum AcquisitionOutcome {
    Decoded(DecodedPayload),
    /// Automated decode found nothing; show this image for cropping
    NeedsManualCrop(CropTarget),
    Failed(FailureReason),
    /// Superseded by a newer attempt or cancelled by the user
    Cancelled,
}

impl AcquisitionOutcome {
    pub fn payload(&self) -> Option<&DecodedPayload> {
        match self {
            AcquisitionOutcome::Decoded(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AcquisitionOutcome::Cancelled)
    }
}

/// What a `Processing` attempt is busy with
#[derive(Debug, Clone)]
pub enum ProcessingStage {
    Normalizing,
    Decoding,
    /// Decoding a crop of this target; a miss returns to it
    CropRetry(CropTarget),
}

#[derive(Debug, Clone, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Processing {
        attempt: AttemptId,
        stage: ProcessingStage,
    },
    Scanning {
        attempt: AttemptId,
    },
    ManualCrop {
        attempt: AttemptId,
        target: CropTarget,
    },
    /// Brief success confirmation before the payload is handed off
    Confirming {
        attempt: AttemptId,
        payload: DecodedPayload,
    },
    Resolved {
        attempt: AttemptId,
        outcome: AcquisitionOutcome,
    },
}

impl AcquisitionState {
    pub fn attempt(&self) -> Option<AttemptId> {
        match self {
            AcquisitionState::Idle => None,
            AcquisitionState::Processing { attempt, .. }
            | AcquisitionState::Scanning { attempt }
            | AcquisitionState::ManualCrop { attempt, .. }
            | AcquisitionState::Confirming { attempt, .. }
            | AcquisitionState::Resolved { attempt, .. } => Some(*attempt),
        }
    }

    /// Whether the UI should show the scanning indicator
    pub fn is_scanning(&self) -> bool {
        matches!(
            self,
            AcquisitionState::Processing { .. } | AcquisitionState::Scanning { .. }
        )
    }

    /// Whether the state owns no resources and accepts no further events
    pub fn is_at_rest(&self) -> bool {
        matches!(
            self,
            AcquisitionState::Idle | AcquisitionState::Resolved { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Processing { .. } => "processing",
            AcquisitionState::Scanning { .. } => "scanning",
            AcquisitionState::ManualCrop { .. } => "manual-crop",
            AcquisitionState::Confirming { .. } => "confirming",
            AcquisitionState::Resolved { .. } => "resolved",
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// A file was picked; starts a new attempt
    FileSelected(AttemptId),
    /// The camera was requested; starts a new attempt
    CameraRequested(AttemptId),
    Normalized,
    Decoded(DecodedPayload),
    NotFound(CropTarget),
    CropConfirmed,
    /// Crop retry found nothing or the crop could not be drawn
    CropMissed,
    /// Success confirmation finished
    ConfirmationShown,
    Failed(FailureReason),
    Cancelled,
}

/// Compute the next state, or `None` when `event` is not valid in `state`
pub fn transition(state: &AcquisitionState, event: AcquisitionEvent) -> Option<AcquisitionState> {
    use AcquisitionEvent as E;
    use AcquisitionState as S;

    match (state, event) {
        // A new attempt may start from anywhere; the old one is superseded
        (_, E::FileSelected(attempt)) => Some(S::Processing {
            attempt,
            stage: ProcessingStage::Normalizing,
        }),
        (_, E::CameraRequested(attempt)) => Some(S::Scanning { attempt }),

        (S::Idle, E::Cancelled) => None,
        (_, E::Cancelled) => Some(S::Idle),

        (
            S::Processing {
                attempt,
                stage: ProcessingStage::Normalizing,
            },
            E::Normalized,
        ) => Some(S::Processing {
            attempt: *attempt,
            stage: ProcessingStage::Decoding,
        }),

        (S::Processing { attempt, stage }, E::Decoded(payload))
            if !matches!(stage, ProcessingStage::Normalizing) =>
        {
            Some(S::Confirming {
                attempt: *attempt,
                payload,
            })
        }
        (S::Scanning { attempt }, E::Decoded(payload)) => Some(S::Confirming {
            attempt: *attempt,
            payload,
        }),

        (
            S::Processing {
                attempt,
                stage: ProcessingStage::Decoding,
            },
            E::NotFound(target),
        ) => Some(S::ManualCrop {
            attempt: *attempt,
            target,
        }),

        (S::ManualCrop { attempt, target }, E::CropConfirmed) => Some(S::Processing {
            attempt: *attempt,
            stage: ProcessingStage::CropRetry(target.clone()),
        }),
        (
            S::Processing {
                attempt,
                stage: ProcessingStage::CropRetry(target),
            },
            E::CropMissed,
        ) => Some(S::ManualCrop {
            attempt: *attempt,
            target: target.clone(),
        }),

        (S::Confirming { attempt, payload }, E::ConfirmationShown) => Some(S::Resolved {
            attempt: *attempt,
            outcome: AcquisitionOutcome::Decoded(payload.clone()),
        }),

        (S::Processing { attempt, .. } | S::Scanning { attempt }, E::Failed(reason)) => {
            Some(S::Resolved {
                attempt: *attempt,
                outcome: AcquisitionOutcome::Failed(reason),
            })
        }

        _ => None,
    }
}

/// Presentation hooks published while an attempt runs
#[derive(Debug, Clone)]
pub enum UxSignal {
    /// Show the scanning indicator
    Scanning(AttemptId),
    /// Brief success confirmation
    Decoded(AttemptId, DecodedPayload),
    /// Show the crop view for this image
    ManualCropRequired(AttemptId, CropTarget),
    /// Camera unavailable; offer upload instead
    CameraPermissionDenied(AttemptId, crate::app::notice::Notice),
    /// Any other user-visible error
    Error(AttemptId, crate::app::notice::Notice),
    /// Back to rest with nothing shown
    Idle,
}
