//! `keelite-vault`: KDBX4 vault engine.
//!
//! Decodes and re-encodes KDBX4 files, models the unlocked document, applies
//! history-preserving entry edits on cloned snapshots, and writes results
//! back into a record store under a persist lock.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod kdbx;
pub mod model;
pub mod query;

pub mod persistence;
pub mod records;
pub mod session;
pub mod store;
pub mod workspace;

pub use error::VaultError;
pub use kdbx::{
    create, decode, encode, inspect_header, save, unlock, Credentials, KdfParameters,
    KeyFileInput, VaultSettings,
};
pub use model::{
    DeletedObject, Document, Entry, EntryValues, FieldValue, Group, Metadata, ProtectedValue,
    Times,
};
pub use persistence::PersistenceCoordinator;
pub use query::{SelectFilter, SortOrder};
pub use records::{Record, RecordPatch, RecordRepository, RecordType, RememberedKey};
pub use session::{unlock_for_session, UnlockSession};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use workspace::{
    create_entry, remove_entry, restore_entry, save_database, save_entry, update_entry,
};
