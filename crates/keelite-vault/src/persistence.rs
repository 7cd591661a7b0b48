//! Serialized write-back of documents into their records.
//!
//! One [`PersistenceCoordinator`] serializes every persist: encrypt, read the
//! record, replace its encrypted bytes, write it back. Concurrent persists of
//! the same record therefore never interleave, and the last one to acquire
//! the lock wins.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::error::VaultError;
use crate::kdbx;
use crate::model::Document;
use crate::records::{RecordPatch, RecordRepository};

/// Owns the persist lock and the record repository it writes to.
#[derive(Debug)]
pub struct PersistenceCoordinator {
    records: Arc<RecordRepository>,
    lock: Mutex<()>,
}

impl PersistenceCoordinator {
    #[must_use]
    pub fn new(records: Arc<RecordRepository>) -> Self {
        Self {
            records,
            lock: Mutex::new(()),
        }
    }

    /// Repository this coordinator writes to.
    #[must_use]
    pub fn records(&self) -> &RecordRepository {
        &self.records
    }

    /// Encrypt `document` and store it as the record's vault bytes. Every
    /// other record field is preserved.
    ///
    /// # Errors
    ///
    /// - [`VaultError::RecordNotFound`] if the record does not exist.
    /// - Any error of [`kdbx::save`].
    /// - [`VaultError::Store`] if the store fails.
    pub async fn persist(&self, document: &Document, record_id: &str) -> Result<(), VaultError> {
        let _guard = self.lock.lock().await;
        let started = Instant::now();

        let encrypted_bytes = kdbx::save(document).await?;
        let len = encrypted_bytes.len();
        self.records
            .patch_record(
                record_id,
                RecordPatch {
                    encrypted_bytes: Some(encrypted_bytes),
                    ..RecordPatch::default()
                },
            )
            .await?;

        tracing::info!(
            record_id,
            len,
            elapsed_ms = started.elapsed().as_millis(),
            "persisted vault"
        );
        Ok(())
    }
}
