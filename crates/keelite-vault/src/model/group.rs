//! Vault groups (folders).

use uuid::Uuid;

use crate::model::element::XmlElement;
use crate::model::entry::Entry;
use crate::model::times::Times;

/// A folder in the vault tree. Owns its child groups and entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// Identity, unique within the document.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Free-form notes.
    pub notes: String,
    /// KeePass icon number.
    pub icon_id: u32,
    /// Timestamps.
    pub times: Times,
    /// Whether the group is expanded in tree views.
    pub is_expanded: bool,
    /// Child groups, in display order.
    pub groups: Vec<Group>,
    /// Direct entries, in display order.
    pub entries: Vec<Entry>,
    /// Children kept verbatim (auto-type defaults, custom data, ...).
    pub extra: Vec<XmlElement>,
}

impl Group {
    /// An empty group with fresh timestamps.
    #[must_use]
    pub fn new(uuid: Uuid, name: &str) -> Self {
        Self {
            uuid,
            name: name.to_owned(),
            notes: String::new(),
            icon_id: 48,
            times: Times::now(),
            is_expanded: true,
            groups: Vec::new(),
            entries: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Find a group by UUID in this subtree, including `self`.
    #[must_use]
    pub fn find_group(&self, uuid: Uuid) -> Option<&Self> {
        if self.uuid == uuid {
            return Some(self);
        }
        self.groups.iter().find_map(|child| child.find_group(uuid))
    }

    /// Mutable variant of [`find_group`](Self::find_group).
    pub fn find_group_mut(&mut self, uuid: Uuid) -> Option<&mut Self> {
        if self.uuid == uuid {
            return Some(self);
        }
        self.groups
            .iter_mut()
            .find_map(|child| child.find_group_mut(uuid))
    }

    /// Find an entry anywhere in this subtree.
    #[must_use]
    pub fn find_entry(&self, uuid: Uuid) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|entry| entry.uuid == uuid)
            .or_else(|| self.groups.iter().find_map(|child| child.find_entry(uuid)))
    }

    /// Mutable variant of [`find_entry`](Self::find_entry).
    pub fn find_entry_mut(&mut self, uuid: Uuid) -> Option<&mut Entry> {
        if let Some(index) = self.entries.iter().position(|entry| entry.uuid == uuid) {
            return self.entries.get_mut(index);
        }
        self.groups
            .iter_mut()
            .find_map(|child| child.find_entry_mut(uuid))
    }

    /// UUID of the group directly holding the entry.
    #[must_use]
    pub fn entry_parent(&self, uuid: Uuid) -> Option<Uuid> {
        if self.entries.iter().any(|entry| entry.uuid == uuid) {
            return Some(self.uuid);
        }
        self.groups
            .iter()
            .find_map(|child| child.entry_parent(uuid))
    }

    /// Detach an entry from this subtree.
    pub fn take_entry(&mut self, uuid: Uuid) -> Option<Entry> {
        if let Some(index) = self.entries.iter().position(|entry| entry.uuid == uuid) {
            return Some(self.entries.remove(index));
        }
        self.groups
            .iter_mut()
            .find_map(|child| child.take_entry(uuid))
    }
}
