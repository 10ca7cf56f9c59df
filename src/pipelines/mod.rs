// SPDX-License-Identifier: GPL-3.0-only

//! Image pipelines
//!
//! - [`crop`]: rasterizes a user-picked region for a decode retry
//! - [`card`]: renders and exports payment cards

pub mod card;
pub mod crop;

pub use card::{CardBackground, CardExport, CardStyle, CardText, export_card, render_card};
pub use crop::{CropRegion, CropResolver};
