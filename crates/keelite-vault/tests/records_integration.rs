#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the record store and session unlock.

use std::sync::Arc;

use data_encoding::BASE64;
use keelite_crypto_core::kdf::ARGON2_VERSION;
use keelite_crypto_core::{Argon2Params, Argon2Variant};
use keelite_vault::kdbx::{self, Credentials, KdfParameters, KeyFileInput};
use keelite_vault::records::{Record, RecordPatch, RecordRepository, RememberedKey};
use keelite_vault::store::{KeyValueStore, MemoryStore, SqliteStore};
use keelite_vault::{session, VaultError, VaultSettings};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn fast_settings() -> VaultSettings {
    VaultSettings {
        kdf: KdfParameters::Argon2(Argon2Params {
            variant: Argon2Variant::Argon2d,
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
            version: ARGON2_VERSION,
        }),
        ..VaultSettings::default()
    }
}

async fn vault_bytes(password: &str, key_file: &KeyFileInput) -> Vec<u8> {
    let credentials = Credentials::new(password, key_file).unwrap();
    let doc = kdbx::create("Session", credentials, fast_settings()).unwrap();
    kdbx::save(&doc).await.unwrap()
}

fn repository() -> (Arc<MemoryStore>, RecordRepository) {
    let store = Arc::new(MemoryStore::new());
    let records = RecordRepository::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);
    (store, records)
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");

    let record = Record::new_local("a.kdbx", vec![1, 2, 3], None).unwrap();
    let id = record.id.clone();
    {
        let store = SqliteStore::open(&path).unwrap();
        let records = RecordRepository::new(Arc::new(store));
        records.create_record(record.clone()).await.unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.schema_version().await.unwrap(), 1);
    let records = RecordRepository::new(Arc::new(store));
    assert_eq!(records.get_record(&id).await.unwrap(), record);
}

#[tokio::test]
async fn sqlite_invalid_value_is_deleted_on_read() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .set("record:bad", json!({ "id": "bad", "type": "local" }))
        .await
        .unwrap();
    let records = RecordRepository::new(Arc::clone(&store) as Arc<dyn KeyValueStore>);

    assert!(records.list_records().await.unwrap().is_empty());
    assert!(store.get("record:bad").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_patches_to_different_fields_both_land() {
    let (_, records) = repository();
    let record = Record::new_local("a.kdbx", vec![1], None).unwrap();
    let id = record.id.clone();
    records.create_record(record).await.unwrap();

    let key = RememberedKey {
        hash: BASE64.encode(b"key"),
        name: "a.key".into(),
    };
    let (bytes, opened) = tokio::join!(
        records.patch_record(
            &id,
            RecordPatch {
                encrypted_bytes: Some(vec![9, 9]),
                ..RecordPatch::default()
            },
        ),
        records.patch_record(
            &id,
            RecordPatch {
                last_opened_at: Some("2025-03-01T10:00:00.000Z".into()),
                key: Some(key.clone()),
                ..RecordPatch::default()
            },
        ),
    );
    bytes.unwrap();
    opened.unwrap();

    let stored = records.get_record(&id).await.unwrap();
    assert_eq!(stored.kdbx.encrypted_bytes, [9, 9]);
    assert_eq!(stored.last_opened_at.as_deref(), Some("2025-03-01T10:00:00.000Z"));
    assert_eq!(stored.key, Some(key));
}

#[tokio::test]
async fn list_is_most_recent_first_with_unopened_last() {
    let (_, records) = repository();
    let mut ids = Vec::new();
    for (name, opened) in [
        ("never.kdbx", None),
        ("old.kdbx", Some("2024-01-01T00:00:00.000Z")),
        ("new.kdbx", Some("2025-06-01T00:00:00.000Z")),
    ] {
        let mut record = Record::new_local(name, vec![0], None).unwrap();
        record.last_opened_at = opened.map(str::to_owned);
        ids.push(record.id.clone());
        records.create_record(record).await.unwrap();
    }

    let names: Vec<_> = records
        .list_records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.kdbx.name)
        .collect();
    assert_eq!(names, ["new.kdbx", "old.kdbx", "never.kdbx"]);

    assert!(records.delete_record(&ids[0]).await.unwrap());
    assert!(!records.delete_record(&ids[0]).await.unwrap());
    assert_eq!(records.list_records().await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Session unlock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unlock_for_session_stamps_last_opened() {
    let (_, records) = repository();
    let record = Record::new_local("s.kdbx", vault_bytes("pw", &KeyFileInput::None).await, None)
        .unwrap();
    let id = record.id.clone();
    records.create_record(record).await.unwrap();

    let session = session::unlock_for_session(&records, &id, "pw").await.unwrap();
    assert_eq!(session.record_id, id);
    assert_eq!(session.record_name, "s.kdbx");
    assert_eq!(session.document.root.name, "Session");

    let stored = records.get_record(&id).await.unwrap();
    let stamp = stored.last_opened_at.unwrap();
    let parsed = chrono::DateTime::parse_from_rfc3339(&stamp).unwrap();
    assert_eq!(
        parsed.timestamp_millis(),
        session.unlocked_at.timestamp_millis()
    );
}

#[tokio::test]
async fn unlock_for_session_uses_remembered_key_file() {
    let key_file = b"any bytes make a key file".to_vec();
    let bytes = vault_bytes("pw", &KeyFileInput::Raw(key_file.clone())).await;
    let (_, records) = repository();
    let record = Record::new_local(
        "k.kdbx",
        bytes,
        Some(RememberedKey {
            hash: BASE64.encode(&key_file),
            name: "vault.key".into(),
        }),
    )
    .unwrap();
    let id = record.id.clone();
    records.create_record(record).await.unwrap();

    assert!(session::unlock_for_session(&records, &id, "pw").await.is_ok());

    records.forget_key_file(&id).await.unwrap();
    let err = session::unlock_for_session(&records, &id, "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidCredentials));
}

#[tokio::test]
async fn failed_unlock_leaves_record_unstamped() {
    let (_, records) = repository();
    let record = Record::new_local("s.kdbx", vault_bytes("pw", &KeyFileInput::None).await, None)
        .unwrap();
    let id = record.id.clone();
    records.create_record(record).await.unwrap();

    let err = session::unlock_for_session(&records, &id, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidCredentials));
    assert!(records.get_record(&id).await.unwrap().last_opened_at.is_none());

    let err = session::unlock_for_session(&records, "missing", "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::RecordNotFound(_)));
}
