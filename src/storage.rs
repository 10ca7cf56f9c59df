// SPDX-License-Identifier: GPL-3.0-only

//! Persistent key-value store
//!
//! One JSON document per key under the data directory, in the spirit of
//! browser local storage. Writes go to a temporary file first and are then
//! renamed over the old document, so a crash never leaves half a file.

use crate::errors::StorageError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct KeyValueStore {
    dir: PathBuf,
}

impl KeyValueStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "Opened key-value store");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Read the document stored under `key`
    ///
    /// A document that no longer parses is logged and reported as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let path = self.path_for(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                error!(key, error = %e, "Stored document is corrupt, ignoring it");
                Ok(None)
            }
        }
    }

    /// Replace the document stored under `key`
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        let json = serde_json::to_string(value)?;
        std::fs::write(&tmp, json).map_err(|e| {
            error!(key, error = %e, "Failed to write document");
            StorageError::from(e)
        })?;
        std::fs::rename(&tmp, &path)?;
        debug!(key, "Document saved");
        Ok(())
    }

    /// Remove the document stored under `key`; missing keys are fine
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                debug!(key, "Document removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
