// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! The backend layer abstracts hardware access, providing a consistent API
//! regardless of where frames come from:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Acquisition Layer               │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │     Camera       │  │ Virtual Camera  │  │
//! │  │ (trait + loop)   │  │ (files/scripts) │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Backend traits, frame types and the per-refresh scan loop
//! - [`virtual_camera`]: Camera backed by image files or a scripted frame list

pub mod camera;
pub mod virtual_camera;
