//! Raw key-value record storage.
//!
//! [`KeyValueStore`] is the seam between the typed record repository and
//! whatever holds the bytes. Values are JSON documents; the store does not
//! validate their shape.
//!
//! ## Implementations
//!
//! - [`MemoryStore`]: process-local map for tests and ephemeral sessions
//! - [`SqliteStore`]: single-table `SQLite` database with embedded,
//!   forward-only migrations

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::error::VaultError;

/// Forward-only SQL migrations, embedded at compile time.
/// Index 0 → version 1, index 1 → version 2, etc.
const MIGRATIONS: &[&str] = &[include_str!("../migrations/001_records.sql")];

/// Async key-value storage of JSON values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value under `key`, or `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>, VaultError>;

    /// Insert or replace the value under `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), VaultError>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, VaultError>;

    /// All keys, in no particular order.
    async fn keys(&self) -> Result<Vec<String>, VaultError>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), VaultError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store. Does not persist across restarts.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MemoryStore(***)")
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, VaultError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), VaultError> {
        self.values.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, VaultError> {
        Ok(self.values.write().await.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.values.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), VaultError> {
        self.values.write().await.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// `SQLite`-backed store. The vault payload inside each record is already
/// KDBX-encrypted, so the database itself is plain `SQLite`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SqliteStore(***)")
    }
}

impl SqliteStore {
    /// Open (or create) a store at `path` and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the database cannot be opened or a
    /// migration fails.
    pub fn open(path: &Path) -> Result<Self, VaultError> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        run_migrations(&mut conn)?;
        tracing::debug!(path = %path.display(), "opened record store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if a migration fails.
    pub fn open_in_memory() -> Result<Self, VaultError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Current schema version (`PRAGMA user_version`).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Store`] if the pragma query fails.
    pub async fn schema_version(&self) -> Result<i32, VaultError> {
        let conn = self.conn.lock().await;
        schema_version(&conn)
    }
}

fn schema_version(conn: &Connection) -> Result<i32, VaultError> {
    let v: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(v)
}

/// Apply all pending migrations, each in its own transaction with the
/// `user_version` bump.
fn run_migrations(conn: &mut Connection) -> Result<(), VaultError> {
    let current = schema_version(conn)?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        // Migration versions are 1-indexed: index 0 → version 1.
        let version = idx
            .checked_add(1)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| VaultError::Store("migration index overflow".into()))?;

        if version <= current {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| VaultError::Store(format!("migration {version} failed: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::debug!(version, "applied record store migration");
    }

    Ok(())
}

fn decode_value(key: &str, text: &str) -> Option<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, "deleting stored value that is not JSON: {e}");
            None
        }
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, VaultError> {
        let conn = self.conn.lock().await;
        let text: Option<String> = conn
            .query_row("SELECT value FROM records WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(text) = text else {
            return Ok(None);
        };
        let value = decode_value(key, &text);
        if value.is_none() {
            conn.execute("DELETE FROM records WHERE key = ?1", [key])?;
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), VaultError> {
        let text = serde_json::to_string(&value)
            .map_err(|e| VaultError::Store(format!("serialize {key}: {e}")))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, text.as_str()],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, VaultError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM records WHERE key = ?1", [key])?;
        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, VaultError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT key FROM records ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    async fn clear(&self) -> Result<(), VaultError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM records", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn exercise(store: &dyn KeyValueStore) {
        assert!(store.get("a").await.unwrap().is_none());
        store.set("a", json!({"x": 1})).await.unwrap();
        store.set("b", json!([1, 2])).await.unwrap();
        store.set("a", json!({"x": 2})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"x": 2})));

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, ["a", "b"]);

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_contract() {
        exercise(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn sqlite_store_contract() {
        exercise(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn sqlite_non_json_row_is_removed_on_read() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("ok", json!(true)).await.unwrap();
        store
            .conn
            .lock()
            .await
            .execute(
                "INSERT INTO records (key, value) VALUES (?1, ?2)",
                ["record:torn", "{\"id\": \"torn\""],
            )
            .unwrap();
        assert_eq!(store.keys().await.unwrap(), ["ok", "record:torn"]);

        assert!(store.get("record:torn").await.unwrap().is_none());
        assert_eq!(store.keys().await.unwrap(), ["ok"]);
        assert_eq!(store.get("ok").await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn migrations_set_user_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().await.unwrap(), 1);
    }

    #[test]
    fn store_is_send_sync() {
        const fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryStore>();
        assert_send_sync::<SqliteStore>();
    }
}
