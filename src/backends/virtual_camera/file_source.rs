// SPDX-License-Identifier: GPL-3.0-only

//! Still-image frame sources for the virtual camera

use crate::backends::camera::types::{BackendResult, CameraFrame};
use crate::constants::file_formats;
use crate::errors::CameraError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load an image file as a single RGBA camera frame
pub fn load_image_as_frame(path: &Path, sequence: u64) -> BackendResult<CameraFrame> {
    debug!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| {
        CameraError::InitializationFailed(format!(
            "Failed to load image '{}': {}",
            path.display(),
            e
        ))
    })?;

    let rgba = img.to_rgba8();
    let width = rgba.width();
    let height = rgba.height();
    let data: Vec<u8> = rgba.into_raw();

    debug!(width, height, "Image loaded successfully");
    Ok(CameraFrame::from_rgba(width, height, data, sequence))
}

/// Expand paths into image files: directories contribute their images in
/// name order, files are taken as given
pub fn collect_image_paths(paths: &[PathBuf]) -> BackendResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|e| {
                CameraError::InitializationFailed(format!("{}: {}", path.display(), e))
            })?;
            let mut images: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(file_formats::is_image_extension)
                })
                .collect();
            images.sort();
            files.extend(images);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

/// Load every image as a frame, in order
pub fn load_frames(paths: &[PathBuf]) -> BackendResult<Vec<CameraFrame>> {
    let files = collect_image_paths(paths)?;
    if files.is_empty() {
        return Err(CameraError::NoCameraFound);
    }
    let frames = files
        .iter()
        .enumerate()
        .map(|(i, path)| load_image_as_frame(path, i as u64))
        .collect::<BackendResult<Vec<_>>>()?;
    info!(frames = frames.len(), "Virtual camera frames loaded");
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{png_bytes, qr_gray, scratch_dir};

    #[test]
    fn test_directory_images_load_in_name_order() {
        let dir = scratch_dir("frames");
        std::fs::write(dir.join("b.png"), png_bytes(&qr_gray("second", 2))).unwrap();
        std::fs::write(dir.join("a.png"), png_bytes(&qr_gray("first", 3))).unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let frames = load_frames(&[dir.clone()]).unwrap();
        assert_eq!(frames.len(), 2);
        // a.png was rendered at 3px per module, b.png at 2px
        assert!(frames[0].width > frames[1].width);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_empty_source_means_no_camera() {
        let dir = scratch_dir("empty-frames");
        assert_eq!(load_frames(&[dir.clone()]).unwrap_err(), CameraError::NoCameraFound);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
