//! Vault entries and their history.

use uuid::Uuid;

use crate::error::VaultError;
use crate::model::element::XmlElement;
use crate::model::field::{FieldValue, ProtectedValue};
use crate::model::times::Times;
use crate::query;

/// Standard field name for the entry title.
pub const TITLE: &str = "Title";
/// Standard field name for the user name.
pub const USERNAME: &str = "UserName";
/// Standard field name for the password (always protected on write).
pub const PASSWORD: &str = "Password";
/// Standard field name for the URL.
pub const URL: &str = "URL";
/// Standard field name for free-form notes.
pub const NOTES: &str = "Notes";

/// Reference from an entry to a blob in the document's binary pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryRef {
    /// File name shown to the user.
    pub name: String,
    /// Index into [`Document::binaries`](crate::model::Document::binaries).
    pub pool_index: usize,
}

/// One credential record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Identity, unique within the document.
    pub uuid: Uuid,
    /// KeePass icon number.
    pub icon_id: u32,
    /// Foreground colour (`#RRGGBB` or empty).
    pub foreground_color: String,
    /// Background colour (`#RRGGBB` or empty).
    pub background_color: String,
    /// URL override for browser integration.
    pub override_url: String,
    /// Tags, case preserved as the user typed them.
    pub tags: Vec<String>,
    /// Timestamps.
    pub times: Times,
    /// Attachments.
    pub binaries: Vec<BinaryRef>,
    /// Prior snapshots, oldest first. Snapshots never carry history.
    pub history: Vec<Entry>,
    /// Children kept verbatim (auto-type, custom data, quality check, ...).
    pub extra: Vec<XmlElement>,
    fields: Vec<(String, FieldValue)>,
}

/// The five editable standard fields plus tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryValues {
    pub title: String,
    pub username: String,
    pub password: String,
    pub url: String,
    pub notes: String,
    pub tags: Vec<String>,
}

impl Entry {
    /// An empty entry with fresh timestamps and the standard fields present,
    /// the password protected.
    #[must_use]
    pub fn new(uuid: Uuid) -> Self {
        let fields = [TITLE, USERNAME, PASSWORD, URL, NOTES]
            .into_iter()
            .map(|name| {
                let value = if name == PASSWORD {
                    FieldValue::Protected(ProtectedValue::empty())
                } else {
                    FieldValue::PlainText(String::new())
                };
                (name.to_owned(), value)
            })
            .collect();
        Self {
            uuid,
            icon_id: 0,
            foreground_color: String::new(),
            background_color: String::new(),
            override_url: String::new(),
            tags: Vec::new(),
            times: Times::now(),
            binaries: Vec::new(),
            history: Vec::new(),
            extra: Vec::new(),
            fields,
        }
    }

    /// Field value by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Field text by name; empty when the field is absent.
    #[must_use]
    pub fn field_text(&self, name: &str) -> String {
        self.field(name).map(FieldValue::reveal_text).unwrap_or_default()
    }

    /// Set a field, keeping its position if it already exists.
    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        if let Some(slot) = self.fields.iter_mut().find(|(key, _)| key == name) {
            slot.1 = value;
        } else {
            self.fields.push((name.to_owned(), value));
        }
    }

    /// Remove a field, returning its value.
    pub fn remove_field(&mut self, name: &str) -> Option<FieldValue> {
        let index = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(index).1)
    }

    pub(crate) fn clear_fields(&mut self) {
        self.fields.clear();
    }

    /// Fields in document order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Snapshot the current state onto the history list.
    ///
    /// The snapshot is flat: its own history is cleared.
    pub fn push_history(&mut self) {
        let mut snapshot = self.clone();
        snapshot.history.clear();
        self.history.push(snapshot);
    }

    /// Editable values, tags normalized.
    #[must_use]
    pub fn values(&self) -> EntryValues {
        EntryValues {
            title: self.field_text(TITLE),
            username: self.field_text(USERNAME),
            password: self.field_text(PASSWORD),
            url: self.field_text(URL),
            notes: self.field_text(NOTES),
            tags: query::entry_tags(self),
        }
    }

    /// Overwrite the standard fields and tags.
    ///
    /// Does not touch history or times; see
    /// [`workspace::update_entry`](crate::workspace::update_entry).
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if the password cannot be masked.
    pub fn apply_values(&mut self, values: &EntryValues) -> Result<(), VaultError> {
        let password = ProtectedValue::from_text(&values.password)?;
        self.set_field(TITLE, values.title.as_str().into());
        self.set_field(USERNAME, values.username.as_str().into());
        self.set_field(PASSWORD, FieldValue::Protected(password));
        self.set_field(URL, values.url.as_str().into());
        self.set_field(NOTES, values.notes.as_str().into());
        self.tags.clone_from(&values.tags);
        Ok(())
    }
}
