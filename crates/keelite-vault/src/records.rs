//! Typed vault records on top of a [`KeyValueStore`].
//!
//! A record ties an encrypted KDBX file to its display name, an optional
//! remembered key file, and (for cloud-sourced records) OAuth and sync state.
//! Stored values must match the record shape exactly; a value that does not
//! is deleted on read and reported as not found.
//!
//! Every operation runs under the repository lock, so a patch always merges
//! onto the latest stored state.

use std::cmp::Reverse;
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::VaultError;
use crate::model;
use crate::store::KeyValueStore;

/// Store key prefix for records.
const KEY_PREFIX: &str = "record:";

fn storage_key(id: &str) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// Where a record's vault comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordType {
    Local,
    GoogleDrive,
}

/// The encrypted vault and its display name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KdbxBlob {
    /// KDBX4 file bytes, base64 in storage.
    #[serde(with = "bytes_as_base64")]
    pub encrypted_bytes: Vec<u8>,
    /// File name shown to the user.
    pub name: String,
}

impl std::fmt::Debug for KdbxBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdbxBlob")
            .field("name", &self.name)
            .field("len", &self.encrypted_bytes.len())
            .finish()
    }
}

/// A remembered key file: base64 of its content (or hash) plus its name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RememberedKey {
    pub hash: String,
    pub name: String,
}

impl std::fmt::Debug for RememberedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RememberedKey")
            .field("hash", &"***")
            .field("name", &self.name)
            .finish()
    }
}

/// OAuth tokens of a cloud-sourced record. Stored, never used here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Sync progress of a cloud-sourced record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Pending,
    Syncing,
    Conflict,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncError {
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncState {
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<SyncError>,
}

/// One stored vault record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Record {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub kdbx: KdbxBlob,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RememberedKey>,
    /// RFC 3339 instant of the last successful unlock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncState>,
}

impl Record {
    /// A local record with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if the CSPRNG fails.
    pub fn new_local(
        name: &str,
        encrypted_bytes: Vec<u8>,
        key: Option<RememberedKey>,
    ) -> Result<Self, VaultError> {
        Ok(Self {
            id: model::new_uuid()?.to_string(),
            record_type: RecordType::Local,
            kdbx: KdbxBlob {
                encrypted_bytes,
                name: name.to_owned(),
            },
            key,
            last_opened_at: None,
            oauth: None,
            sync: None,
        })
    }

    /// Milliseconds since the epoch of `last_opened_at`; missing or
    /// unparseable values count as the epoch.
    fn last_opened_millis(&self) -> i64 {
        self.last_opened_at
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map_or(0, |t| t.timestamp_millis())
    }

    /// Drop cloud-only state from local records.
    fn normalized(mut self) -> Self {
        if self.record_type == RecordType::Local {
            self.oauth = None;
            self.sync = None;
        }
        self
    }
}

/// Partial update merged onto a stored record. `None` leaves a field as is.
#[derive(Clone, Debug, Default)]
pub struct RecordPatch {
    pub kdbx_name: Option<String>,
    pub encrypted_bytes: Option<Vec<u8>>,
    pub key: Option<RememberedKey>,
    pub last_opened_at: Option<String>,
    pub oauth: Option<OAuthToken>,
    pub sync: Option<SyncState>,
}

impl RecordPatch {
    fn apply(self, record: &mut Record) {
        if let Some(name) = self.kdbx_name {
            record.kdbx.name = name;
        }
        if let Some(bytes) = self.encrypted_bytes {
            record.kdbx.encrypted_bytes = bytes;
        }
        if let Some(key) = self.key {
            record.key = Some(key);
        }
        if let Some(at) = self.last_opened_at {
            record.last_opened_at = Some(at);
        }
        if let Some(oauth) = self.oauth {
            record.oauth = Some(oauth);
        }
        if let Some(sync) = self.sync {
            record.sync = Some(sync);
        }
    }
}

/// Validated record access with its own lock.
pub struct RecordRepository {
    store: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for RecordRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecordRepository(***)")
    }
}

impl RecordRepository {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Read a record.
    ///
    /// # Errors
    ///
    /// - [`VaultError::RecordNotFound`] if absent or if the stored value had
    ///   an invalid shape (it is deleted).
    /// - [`VaultError::Store`] if the store fails.
    pub async fn get_record(&self, id: &str) -> Result<Record, VaultError> {
        let _guard = self.lock.lock().await;
        self.read(id).await
    }

    /// Replace a record by its id.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the store fails.
    pub async fn update_record(&self, record: Record) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        self.write(record).await
    }

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// - [`VaultError::DuplicateRecord`] if a local record with the same
    ///   vault name exists.
    /// - [`VaultError::Validation`] if the id is taken.
    /// - [`VaultError::Store`] if the store fails.
    pub async fn create_record(&self, record: Record) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        let existing = self.read_all().await?;
        if existing.iter().any(|r| r.id == record.id) {
            return Err(VaultError::Validation(format!(
                "record id {} already exists",
                record.id
            )));
        }
        if record.record_type == RecordType::Local
            && existing
                .iter()
                .any(|r| r.record_type == RecordType::Local && r.kdbx.name == record.kdbx.name)
        {
            return Err(VaultError::DuplicateRecord(record.kdbx.name));
        }
        tracing::info!(id = %record.id, "created record");
        self.write(record).await
    }

    /// Merge `patch` onto the stored record and return the result.
    ///
    /// # Errors
    ///
    /// - [`VaultError::RecordNotFound`] if the record does not exist.
    /// - [`VaultError::Store`] if the store fails.
    pub async fn patch_record(&self, id: &str, patch: RecordPatch) -> Result<Record, VaultError> {
        let _guard = self.lock.lock().await;
        let mut record = self.read(id).await?;
        patch.apply(&mut record);
        self.write(record.clone()).await?;
        tracing::debug!(id, "patched record");
        Ok(record.normalized())
    }

    /// Delete a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the store fails.
    pub async fn delete_record(&self, id: &str) -> Result<bool, VaultError> {
        let _guard = self.lock.lock().await;
        self.store.delete(&storage_key(id)).await
    }

    /// All valid records, most recently opened first.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the store fails.
    pub async fn list_records(&self) -> Result<Vec<Record>, VaultError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.sort_by_key(|r| Reverse(r.last_opened_millis()));
        Ok(records)
    }

    /// Delete every record.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the store fails.
    pub async fn clear(&self) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        for key in self.store.keys().await? {
            if key.starts_with(KEY_PREFIX) {
                self.store.delete(&key).await?;
            }
        }
        Ok(())
    }

    /// Remember a key file for a record.
    ///
    /// # Errors
    ///
    /// Same as [`patch_record`](Self::patch_record).
    pub async fn remember_key_file(
        &self,
        id: &str,
        key: RememberedKey,
    ) -> Result<Record, VaultError> {
        self.patch_record(
            id,
            RecordPatch {
                key: Some(key),
                ..RecordPatch::default()
            },
        )
        .await
    }

    /// Forget a record's key file.
    ///
    /// # Errors
    ///
    /// - [`VaultError::RecordNotFound`] if the record does not exist.
    /// - [`VaultError::Store`] if the store fails.
    pub async fn forget_key_file(&self, id: &str) -> Result<Record, VaultError> {
        let _guard = self.lock.lock().await;
        let mut record = self.read(id).await?;
        record.key = None;
        self.write(record.clone()).await?;
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Unlocked helpers
    // -----------------------------------------------------------------------

    async fn read(&self, id: &str) -> Result<Record, VaultError> {
        let key = storage_key(id);
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| VaultError::RecordNotFound(id.to_owned()))?;
        match self.validate(&key, value).await? {
            Some(record) => Ok(record),
            None => Err(VaultError::RecordNotFound(id.to_owned())),
        }
    }

    async fn read_all(&self) -> Result<Vec<Record>, VaultError> {
        let mut records = Vec::new();
        for key in self.store.keys().await? {
            if !key.starts_with(KEY_PREFIX) {
                continue;
            }
            let Some(value) = self.store.get(&key).await? else {
                continue;
            };
            if let Some(record) = self.validate(&key, value).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Parse a stored value, deleting it when the shape is wrong.
    async fn validate(&self, key: &str, value: Value) -> Result<Option<Record>, VaultError> {
        match serde_json::from_value::<Record>(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(key, "deleting invalid record: {e}");
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }

    async fn write(&self, record: Record) -> Result<(), VaultError> {
        let record = record.normalized();
        let value = serde_json::to_value(&record)
            .map_err(|e| VaultError::Store(format!("serialize record: {e}")))?;
        self.store.set(&storage_key(&record.id), value).await
    }
}

mod bytes_as_base64 {
    use data_encoding::BASE64;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes bytes as standard padded base64.
    #[allow(clippy::ptr_arg)]
    pub(super) fn serialize<S: Serializer>(v: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        String::serialize(&BASE64.encode(v), s)
    }

    /// Deserializes a base64 string back into bytes.
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        BASE64
            .decode(String::deserialize(d)?.as_bytes())
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))
    }
}
