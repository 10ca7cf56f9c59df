// SPDX-License-Identifier: GPL-3.0-only

//! Image sources flowing through the acquisition pipeline

use crate::app::acquisition::preview::PreviewRef;
use crate::backends::camera::types::CameraFrame;
use crate::constants::file_formats;
use std::path::Path;
use std::sync::Arc;

/// A user-picked file: bytes plus whatever the picker claimed about them
///
/// The declared MIME type is kept separately from the name because pickers
/// are known to misreport HEIF uploads; the normalizer looks at both.
#[derive(Clone)]
pub struct SourceFile {
    name: String,
    mime: Option<String>,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: Option<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk
    ///
    /// When `mime` is not given it is guessed from the extension, the same
    /// way a browser file picker fills in `File.type`.
    pub async fn read(path: &Path, mime: Option<String>) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime.or_else(|| {
            path.extension()
                .and_then(|e| e.to_str())
                .and_then(file_formats::mime_for_extension)
                .map(str::to_string)
        });
        Ok(Self::new(name, mime, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    /// Lowercased file extension, if the name has one
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Encoded image bytes in a format the raster decoder understands
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    mime: String,
    bytes: Arc<[u8]>,
}

impl ImageBlob {
    pub fn new(mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ImageBlob({}, {} bytes)", self.mime, self.bytes.len())
    }
}

/// Opaque handle to image bytes, owned by whichever stage holds it
#[derive(Debug, Clone)]
pub enum RawImageSource {
    /// A picked file, before normalization
    File(SourceFile),
    /// In-memory encoded image (normalized upload, cropped region)
    Blob(ImageBlob),
    /// A captured camera frame
    Frame(Arc<CameraFrame>),
    /// A preview handle backing the crop UI
    ObjectUrl(PreviewRef),
}

impl RawImageSource {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RawImageSource::File(_) => "file",
            RawImageSource::Blob(_) => "blob",
            RawImageSource::Frame(_) => "camera-frame",
            RawImageSource::ObjectUrl(_) => "object-url",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_lowercased() {
        let file = SourceFile::new("IMG_0001.HEIC", None, vec![0u8; 4]);
        assert_eq!(file.extension().as_deref(), Some("heic"));
        assert_eq!(SourceFile::new("noext", None, Vec::new()).extension(), None);
    }

    #[tokio::test]
    async fn test_read_guesses_mime_from_extension() {
        let dir = std::env::temp_dir().join(format!("qsend-source-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("code.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let file = SourceFile::read(&path, None).await.unwrap();
        assert_eq!(file.name(), "code.png");
        assert_eq!(file.mime(), Some("image/png"));
        assert_eq!(file.bytes().len(), 16);

        let overridden = SourceFile::read(&path, Some("image/heic".into())).await.unwrap();
        assert_eq!(overridden.mime(), Some("image/heic"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
