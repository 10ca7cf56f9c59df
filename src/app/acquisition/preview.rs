// SPDX-License-Identifier: GPL-3.0-only

//! Preview handles backing the manual crop view
//!
//! A preview is the on-disk counterpart of a browser object URL: the
//! normalized image is written to the preview directory so a viewer can
//! display it, and the file is removed when the handle is revoked. The
//! registry counts live handles so leaks show up in tests.

use crate::errors::ResourceError;
use crate::media::ImageBlob;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// Allocates preview handles in one directory
#[derive(Debug, Clone)]
pub struct PreviewRegistry {
    dir: PathBuf,
    live: Arc<AtomicUsize>,
}

impl PreviewRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `blob` out and hand back an owning handle to it
    pub async fn create(&self, blob: &ImageBlob) -> Result<PreviewUrl, ResourceError> {
        let alloc = |e: std::io::Error| ResourceError::AllocationFailed(e.to_string());
        tokio::fs::create_dir_all(&self.dir).await.map_err(alloc)?;

        let id = Uuid::new_v4();
        let path = self.dir.join(format!("preview-{}", id));
        write_whole(&path, blob.bytes()).await.map_err(alloc)?;

        self.live.fetch_add(1, Ordering::SeqCst);
        debug!(%id, size = blob.len(), "Preview created");
        Ok(PreviewUrl {
            reference: PreviewRef {
                id,
                path: Arc::new(path),
            },
            live: Arc::clone(&self.live),
            revoked: false,
        })
    }

    /// Previews created and not yet revoked
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Write `bytes` under a temporary name and move it to `path` once complete
///
/// On failure nothing is left behind at either name.
async fn write_whole(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let partial = path.with_extension("part");
    let written = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &written {
        warn!(path = %path.display(), error = %e, "Preview write failed, removing partial file");
        let _ = tokio::fs::remove_file(&partial).await;
    }
    written
}

/// Non-owning reference to a preview, safe to pass around and clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRef {
    id: Uuid,
    path: Arc<PathBuf>,
}

impl PreviewRef {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Owning preview handle; revoked explicitly or on drop
#[derive(Debug)]
pub struct PreviewUrl {
    reference: PreviewRef,
    live: Arc<AtomicUsize>,
    revoked: bool,
}

impl PreviewUrl {
    pub fn reference(&self) -> PreviewRef {
        self.reference.clone()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Remove the backing file. Idempotent.
    pub fn revoke(&mut self) {
        if self.revoked {
            return;
        }
        self.revoked = true;
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Err(e) = std::fs::remove_file(self.reference.path()) {
            warn!(id = %self.reference.id, error = %e, "Failed to remove preview file");
        } else {
            debug!(id = %self.reference.id, "Preview revoked");
        }
    }
}

impl Drop for PreviewUrl {
    fn drop(&mut self) {
        self.revoke();
    }
}
