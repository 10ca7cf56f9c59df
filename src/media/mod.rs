// SPDX-License-Identifier: GPL-3.0-only

//! Image inputs for the acquisition pipeline
//!
//! - [`source`]: the image handles that move between pipeline stages
//! - [`normalizer`]: turns picked files into decodable raster blobs
//! - [`heif`]: HEIF container decoding seam (libheif behind the `heif` feature)

pub mod heif;
pub mod normalizer;
pub mod source;

// Re-export commonly used types
pub use normalizer::ImageNormalizer;
pub use source::{ImageBlob, RawImageSource, SourceFile};
