// SPDX-License-Identifier: GPL-3.0-only

//! Qsend - scan, decorate, save and share payment QR codes, fully offline
//!
//! This library provides the acquisition pipeline that turns an uploaded
//! photo or a live camera feed into a decoded payment payload, plus the
//! local gallery, expense ledger and card export built on top of it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: Acquisition orchestration, QR decoding, gallery and expenses
//! - [`backends`]: Camera backend abstraction
//! - [`media`]: Image sources and format normalization
//! - [`pipelines`]: Crop rasterization and card rendering
//! - [`config`]: User configuration handling
//! - [`storage`]: Local JSON document store
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = AcquisitionOrchestrator::new(settings, camera, previews);
//! let outcome = orchestrator.submit_file(file).await;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod storage;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use app::acquisition::{AcquisitionOrchestrator, AcquisitionOutcome, AcquisitionState};
pub use app::frame_processor::{DecodedPayload, QrDetection};
pub use config::Config;
pub use errors::AppError;
