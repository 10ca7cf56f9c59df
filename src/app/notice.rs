// SPDX-License-Identifier: GPL-3.0-only

//! User-visible error notices
//!
//! Transient notices dismiss themselves after a short interval. Persistent
//! ones stay until the user does something about them (switches to upload,
//! picks another file).

use std::time::Duration;

/// What a notice is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Automated decode failed; the user should frame the code by hand
    ManualCropRequired,
    /// Crop retry found nothing; adjust and try again
    DecodeError,
    /// The crop could not be rasterized
    Rasterization,
    /// A preview could not be allocated
    Resource,
    /// Camera refused or missing
    PermissionDenied,
    /// The picked file cannot be read as an image
    UnsupportedFormat,
    /// The camera stopped before a code was found
    Camera,
    /// Decode took longer than the configured watchdog
    Timeout,
    /// Exporting or sharing the card failed
    Share,
}

/// How long a notice stays on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Dismissed automatically after the interval
    Transient(Duration),
    /// Stays until the user acts
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub persistence: Persistence,
}

impl Notice {
    pub fn transient(kind: NoticeKind, message: impl Into<String>, after: Duration) -> Self {
        Self {
            kind,
            message: message.into(),
            persistence: Persistence::Transient(after),
        }
    }

    pub fn persistent(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            persistence: Persistence::Persistent,
        }
    }

    /// Interval after which the notice should disappear on its own
    pub fn auto_dismiss_after(&self) -> Option<Duration> {
        match self.persistence {
            Persistence::Transient(after) => Some(after),
            Persistence::Persistent => None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence == Persistence::Persistent
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
