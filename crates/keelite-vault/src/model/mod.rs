//! In-memory vault document.
//!
//! The [`Document`] owns the whole group tree by value. Cross references
//! (recycle bin, default group) are UUIDs resolved at use time, so
//! `Document::clone` is a full deep copy with no shared state.

pub mod element;
pub mod entry;
pub mod field;
pub mod group;
pub mod times;

use chrono::{DateTime, Utc};
use keelite_crypto_core::rng;
use uuid::Uuid;

use crate::error::VaultError;
use crate::kdbx::{Credentials, VaultSettings};

pub use element::XmlElement;
pub use entry::{BinaryRef, Entry, EntryValues};
pub use field::{FieldValue, ProtectedValue};
pub use group::Group;
pub use times::Times;

/// Name given to a recycle bin created on first removal.
pub const RECYCLE_BIN_NAME: &str = "Recycle Bin";

/// Generator string written to `<Meta>`.
pub const GENERATOR: &str = "keelite";

/// Fresh random (v4) UUID drawn from the CSPRNG.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the CSPRNG fails.
pub fn new_uuid() -> Result<Uuid, VaultError> {
    Ok(uuid::Builder::from_random_bytes(rng::random_array::<16>()?).into_uuid())
}

/// Database-wide metadata (`<Meta>`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub generator: String,
    pub name: String,
    pub name_changed: DateTime<Utc>,
    pub description: String,
    pub description_changed: DateTime<Utc>,
    pub default_user_name: String,
    /// Whether removal goes through the recycle bin.
    pub recycle_bin_enabled: bool,
    /// Designated recycle-bin group; `None` until one exists.
    pub recycle_bin_uuid: Option<Uuid>,
    pub recycle_bin_changed: DateTime<Utc>,
    pub history_max_items: i32,
    pub history_max_size: i64,
    /// `<Meta>` children kept verbatim (custom icons, memory protection,
    /// custom data and the like).
    pub extra: Vec<XmlElement>,
}

impl Metadata {
    /// Metadata for a new vault named `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let t = times::now();
        Self {
            generator: GENERATOR.to_owned(),
            name: name.to_owned(),
            name_changed: t,
            description: String::new(),
            description_changed: t,
            default_user_name: String::new(),
            recycle_bin_enabled: true,
            recycle_bin_uuid: None,
            recycle_bin_changed: t,
            history_max_items: 10,
            history_max_size: 6_291_456,
            extra: Vec::new(),
        }
    }
}

/// Tombstone for a permanently deleted object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletedObject {
    pub uuid: Uuid,
    pub deleted_at: DateTime<Utc>,
}

/// Blob in the inner-header binary pool.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Raw content.
    pub data: Vec<u8>,
    /// Whether the blob is flagged for in-memory protection.
    pub protected: bool,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("len", &self.data.len())
            .field("protected", &self.protected)
            .finish()
    }
}

/// An unlocked vault.
#[derive(Clone, Debug)]
pub struct Document {
    /// Root of the group tree. Also the default group for new entries.
    pub root: Group,
    /// `<Meta>` values.
    pub meta: Metadata,
    /// Tombstones, oldest first.
    pub deleted_objects: Vec<DeletedObject>,
    /// Inner-header binary pool referenced by [`BinaryRef::pool_index`].
    pub binaries: Vec<Attachment>,
    /// Container parameters used on the next save.
    pub settings: VaultSettings,
    credentials: Credentials,
}

impl Document {
    /// Assemble a document. Used by the codec and by [`crate::kdbx::create`].
    #[must_use]
    pub const fn new(
        root: Group,
        meta: Metadata,
        settings: VaultSettings,
        credentials: Credentials,
    ) -> Self {
        Self {
            root,
            meta,
            deleted_objects: Vec::new(),
            binaries: Vec::new(),
            settings,
            credentials,
        }
    }

    /// Credentials retained for re-encryption.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Replace the credentials used by the next save.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    /// Entry anywhere in the tree.
    #[must_use]
    pub fn find_entry(&self, uuid: Uuid) -> Option<&Entry> {
        self.root.find_entry(uuid)
    }

    /// Mutable entry anywhere in the tree.
    pub fn find_entry_mut(&mut self, uuid: Uuid) -> Option<&mut Entry> {
        self.root.find_entry_mut(uuid)
    }

    /// Group anywhere in the tree, root included.
    #[must_use]
    pub fn find_group(&self, uuid: Uuid) -> Option<&Group> {
        self.root.find_group(uuid)
    }

    /// Mutable group anywhere in the tree.
    pub fn find_group_mut(&mut self, uuid: Uuid) -> Option<&mut Group> {
        self.root.find_group_mut(uuid)
    }

    /// UUID of the group holding the entry.
    #[must_use]
    pub fn entry_location(&self, uuid: Uuid) -> Option<Uuid> {
        self.root.entry_parent(uuid)
    }

    /// Group that receives new and restored entries.
    #[must_use]
    pub const fn default_group_uuid(&self) -> Uuid {
        self.root.uuid
    }

    /// The designated recycle-bin group, if it resolves.
    #[must_use]
    pub fn recycle_bin(&self) -> Option<&Group> {
        self.meta
            .recycle_bin_uuid
            .and_then(|uuid| self.find_group(uuid))
    }

    /// Whether the entry lives in the recycle bin or any group nested under it.
    #[must_use]
    pub fn is_recycled(&self, entry_uuid: Uuid) -> bool {
        self.recycle_bin()
            .is_some_and(|bin| bin.find_entry(entry_uuid).is_some())
    }

    /// Detach an entry from wherever it lives.
    pub fn take_entry(&mut self, uuid: Uuid) -> Option<Entry> {
        self.root.take_entry(uuid)
    }

    /// Append an entry to a group.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::GroupNotFound`] if `group` does not resolve. The
    /// entry is dropped in that case.
    pub fn insert_entry(&mut self, group: Uuid, entry: Entry) -> Result<(), VaultError> {
        let target = self
            .find_group_mut(group)
            .ok_or(VaultError::GroupNotFound(group))?;
        target.entries.push(entry);
        Ok(())
    }

    /// Resolve the recycle bin, creating it under the root when enabled but
    /// missing. `None` when the recycle bin is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if a UUID cannot be generated.
    pub fn ensure_recycle_bin(&mut self) -> Result<Option<Uuid>, VaultError> {
        if !self.meta.recycle_bin_enabled {
            return Ok(None);
        }
        if let Some(existing) = self.recycle_bin().map(|group| group.uuid) {
            return Ok(Some(existing));
        }
        let mut bin = Group::new(new_uuid()?, RECYCLE_BIN_NAME);
        bin.icon_id = 43;
        bin.is_expanded = false;
        let uuid = bin.uuid;
        self.root.groups.push(bin);
        self.meta.recycle_bin_uuid = Some(uuid);
        self.meta.recycle_bin_changed = times::now();
        tracing::debug!(%uuid, "created recycle bin");
        Ok(Some(uuid))
    }
}

/// Structural equality, credentials and container settings excluded.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.meta == other.meta
            && self.deleted_objects == other.deleted_objects
            && self.binaries == other.binaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdbx::KeyFileInput;

    fn document() -> Document {
        let credentials = Credentials::new("pw", &KeyFileInput::None).unwrap();
        Document::new(
            Group::new(Uuid::from_u128(1), "Root"),
            Metadata::new("Test"),
            VaultSettings::default(),
            credentials,
        )
    }

    #[test]
    fn new_uuid_is_v4() {
        assert_eq!(new_uuid().unwrap().get_version_num(), 4);
        assert_ne!(new_uuid().unwrap(), new_uuid().unwrap());
    }

    #[test]
    fn default_group_is_root() {
        let doc = document();
        assert_eq!(doc.default_group_uuid(), Uuid::from_u128(1));
    }

    #[test]
    fn ensure_recycle_bin_creates_once() {
        let mut doc = document();
        let first = doc.ensure_recycle_bin().unwrap().unwrap();
        let second = doc.ensure_recycle_bin().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(doc.root.groups.len(), 1);
        assert_eq!(doc.recycle_bin().unwrap().name, RECYCLE_BIN_NAME);
    }

    #[test]
    fn ensure_recycle_bin_respects_disabled_flag() {
        let mut doc = document();
        doc.meta.recycle_bin_enabled = false;
        assert!(doc.ensure_recycle_bin().unwrap().is_none());
        assert!(doc.root.groups.is_empty());
    }

    #[test]
    fn insert_entry_into_missing_group_fails() {
        let mut doc = document();
        let err = doc
            .insert_entry(Uuid::from_u128(99), Entry::new(Uuid::from_u128(5)))
            .unwrap_err();
        assert!(matches!(err, VaultError::GroupNotFound(_)));
    }

    #[test]
    fn clone_is_independent() {
        let mut doc = document();
        doc.root.entries.push(Entry::new(Uuid::from_u128(5)));
        let mut copy = doc.clone();
        copy.find_entry_mut(Uuid::from_u128(5)).unwrap().tags.push("x".into());
        copy.root.entries.push(Entry::new(Uuid::from_u128(6)));
        assert!(doc.find_entry(Uuid::from_u128(5)).unwrap().tags.is_empty());
        assert_eq!(doc.root.entries.len(), 1);
    }
}
