//! Unlocking a stored record into a working session.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::VaultError;
use crate::kdbx::{self, Credentials, KeyFileInput};
use crate::model::Document;
use crate::records::{RecordPatch, RecordRepository, RecordType};

/// An unlocked record. Owned by the caller; there is no global session.
#[derive(Debug)]
pub struct UnlockSession {
    pub document: Document,
    pub record_id: String,
    pub record_name: String,
    pub record_type: RecordType,
    pub unlocked_at: DateTime<Utc>,
}

/// Unlock a record with `password` and its remembered key file, then stamp
/// the record's `last_opened_at`.
///
/// # Errors
///
/// - [`VaultError::RecordNotFound`] if the record does not exist.
/// - [`VaultError::InvalidCredentials`] for a wrong password or key file.
/// - Any other [`kdbx::unlock`] or store error.
pub async fn unlock_for_session(
    records: &RecordRepository,
    record_id: &str,
    password: &str,
) -> Result<UnlockSession, VaultError> {
    let record = records.get_record(record_id).await?;
    let key_file = KeyFileInput::from_remembered(record.key.as_ref().map(|k| k.hash.as_str()));
    let credentials = Credentials::new(password, &key_file)?;
    let unlocked_at = Utc::now();

    let document = kdbx::unlock(&record.kdbx.encrypted_bytes, &credentials).await?;

    records
        .patch_record(
            record_id,
            RecordPatch {
                last_opened_at: Some(unlocked_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ..RecordPatch::default()
            },
        )
        .await?;
    tracing::info!(record_id, "session unlocked");

    Ok(UnlockSession {
        document,
        record_id: record.id,
        record_name: record.kdbx.name,
        record_type: record.record_type,
        unlocked_at,
    })
}
