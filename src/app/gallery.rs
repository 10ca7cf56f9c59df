// SPDX-License-Identifier: GPL-3.0-only

//! Saved QR vault and recycle bin
//!
//! Every mutation writes the whole collection back to the store right away.
//! Deleting is soft by default: records get a `deleted_at` stamp and move
//! to the recycle bin until restored or purged.

use crate::app::frame_processor::DecodedPayload;
use crate::constants::{card, storage_keys};
use crate::errors::StorageError;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A saved payment QR code and its card settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRecord {
    pub id: String,
    /// Decoded payload, stored verbatim
    pub raw_value: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    /// Path of a user-picked background image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
}

impl QrRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn payload(&self) -> DecodedPayload {
        DecodedPayload::new(self.raw_value.clone())
    }

    /// Label to show in lists
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(card::DEFAULT_SAVE_LABEL)
    }

    pub fn card(&self) -> CardSettings {
        CardSettings {
            amount: self.amount.clone(),
            theme_id: self.theme_id.clone(),
            custom_background: self.custom_background.clone(),
        }
    }
}

/// Card decoration stored alongside a record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardSettings {
    pub amount: Option<String>,
    pub theme_id: Option<String>,
    pub custom_background: Option<String>,
}

impl CardSettings {
    /// Empty strings mean "not set"
    fn normalized(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            amount: keep(self.amount),
            theme_id: keep(self.theme_id),
            custom_background: keep(self.custom_background),
        }
    }
}

pub struct Gallery {
    store: KeyValueStore,
    records: Vec<QrRecord>,
}

impl Gallery {
    /// Load the vault from `store`; a missing or corrupt vault is empty
    pub fn load(store: KeyValueStore) -> Result<Self, StorageError> {
        let records: Vec<QrRecord> = store.get(storage_keys::VAULT)?.unwrap_or_default();
        debug!(count = records.len(), "Gallery loaded");
        Ok(Self { store, records })
    }

    pub fn records(&self) -> &[QrRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&QrRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Fetch a record for editing; records in the recycle bin are refused
    pub fn open(&self, id: &str) -> Result<&QrRecord, StorageError> {
        let record = self
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        if record.is_deleted() {
            return Err(StorageError::Invalid(format!(
                "'{}' is in the recycle bin; restore it first",
                record.display_label()
            )));
        }
        Ok(record)
    }

    /// Save a freshly decoded payload under a user-given label
    pub fn save_new(
        &mut self,
        payload: &DecodedPayload,
        label: &str,
        settings: CardSettings,
        now: DateTime<Utc>,
    ) -> Result<&QrRecord, StorageError> {
        let label = non_empty_label(label)?;
        let record = new_record(payload, label, settings, now);
        info!(id = %record.id, "Saving new QR");
        self.records.insert(0, record);
        self.persist()?;
        Ok(&self.records[0])
    }

    /// Save the card currently in the editor
    ///
    /// With `id`, updates that record's card settings and leaves its label
    /// alone. Without, creates a new record labelled `label` or the default
    /// save label.
    pub fn save_card(
        &mut self,
        id: Option<&str>,
        payload: &DecodedPayload,
        settings: CardSettings,
        label: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<&QrRecord, StorageError> {
        let settings = settings.normalized();
        if let Some(id) = id {
            let index = self.index_of(id)?;
            let record = &mut self.records[index];
            record.amount = settings.amount;
            record.theme_id = settings.theme_id;
            record.custom_background = settings.custom_background;
            debug!(id, "Updated card settings");
            self.persist()?;
            return Ok(&self.records[index]);
        }

        let label = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(card::DEFAULT_SAVE_LABEL)
            .to_string();
        let record = new_record(payload, label, settings, now);
        info!(id = %record.id, "Saving card as new QR");
        self.records.insert(0, record);
        self.persist()?;
        Ok(&self.records[0])
    }

    pub fn rename(&mut self, id: &str, label: &str) -> Result<(), StorageError> {
        let label = non_empty_label(label)?;
        let index = self.index_of(id)?;
        self.records[index].label = Some(label);
        self.persist()
    }

    /// Move a record to the recycle bin
    pub fn soft_delete(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
        let index = self.index_of(id)?;
        self.records[index].deleted_at = Some(now.timestamp_millis());
        info!(id, "Moved QR to recycle bin");
        self.persist()
    }

    pub fn restore(&mut self, id: &str) -> Result<(), StorageError> {
        let index = self.index_of(id)?;
        self.records[index].deleted_at = None;
        info!(id, "Restored QR from recycle bin");
        self.persist()
    }

    pub fn delete_permanently(&mut self, id: &str) -> Result<(), StorageError> {
        let index = self.index_of(id)?;
        self.records.remove(index);
        info!(id, "Deleted QR permanently");
        self.persist()
    }

    /// Purge everything in the recycle bin; returns how many were dropped
    pub fn empty_bin(&mut self) -> Result<usize, StorageError> {
        let before = self.records.len();
        self.records.retain(|r| !r.is_deleted());
        let purged = before - self.records.len();
        info!(purged, "Emptied recycle bin");
        self.persist()?;
        Ok(purged)
    }

    /// Wipe the whole vault
    pub fn delete_all(&mut self) -> Result<(), StorageError> {
        self.records.clear();
        info!("Deleted all saved QRs");
        self.store.remove(storage_keys::VAULT)
    }

    /// Records not in the bin whose label contains `search` (any case),
    /// newest first
    pub fn active(&self, search: &str) -> Vec<&QrRecord> {
        let needle = search.to_lowercase();
        let mut active: Vec<&QrRecord> = self
            .records
            .iter()
            .filter(|r| !r.is_deleted())
            .filter(|r| {
                needle.is_empty()
                    || r.label
                        .as_deref()
                        .is_some_and(|l| l.to_lowercase().contains(&needle))
            })
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        active
    }

    /// Records in the bin, most recently deleted first
    pub fn recycle_bin(&self) -> Vec<&QrRecord> {
        let mut bin: Vec<&QrRecord> = self.records.iter().filter(|r| r.is_deleted()).collect();
        bin.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        bin
    }

    fn index_of(&self, id: &str) -> Result<usize, StorageError> {
        self.records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn persist(&self) -> Result<(), StorageError> {
        self.store.set(storage_keys::VAULT, &self.records)
    }
}

fn non_empty_label(label: &str) -> Result<String, StorageError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(StorageError::Invalid("label must not be empty".into()));
    }
    Ok(label.to_string())
}

fn new_record(
    payload: &DecodedPayload,
    label: String,
    settings: CardSettings,
    now: DateTime<Utc>,
) -> QrRecord {
    let settings = settings.normalized();
    QrRecord {
        id: uuid::Uuid::new_v4().to_string(),
        raw_value: payload.as_str().to_string(),
        created_at: now.timestamp_millis(),
        label: Some(label),
        amount: settings.amount,
        theme_id: settings.theme_id,
        custom_background: settings.custom_background,
        deleted_at: None,
        is_pinned: None,
    }
}
