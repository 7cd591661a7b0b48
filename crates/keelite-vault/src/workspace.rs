//! Entry mutations.
//!
//! Each operation clones the caller's document, edits the clone, persists
//! it through the [`PersistenceCoordinator`], and returns the clone. The
//! caller's document is never touched; on failure the clone is dropped and
//! the stored record is unchanged.

use uuid::Uuid;

use crate::error::VaultError;
use crate::model::{self, DeletedObject, Document, Entry, EntryValues};
use crate::persistence::PersistenceCoordinator;
use crate::query::{self, SelectFilter};

/// Apply edited values to an entry in place: snapshot history, rewrite the
/// standard fields and tags, touch the timestamps.
///
/// # Errors
///
/// Returns [`VaultError::Crypto`] if the password cannot be masked.
pub fn update_entry(entry: &mut Entry, values: &EntryValues) -> Result<(), VaultError> {
    entry.push_history();
    entry.apply_values(values)?;
    entry.times.touch();
    Ok(())
}

/// Persist the document as is.
///
/// # Errors
///
/// Same as [`PersistenceCoordinator::persist`].
pub async fn save_database(
    coordinator: &PersistenceCoordinator,
    document: &Document,
    record_id: &str,
) -> Result<(), VaultError> {
    coordinator.persist(document, record_id).await
}

/// Edit an entry and persist. Returns the new document and the entry UUID.
///
/// # Errors
///
/// - [`VaultError::EntryNotFound`] if the entry does not resolve.
/// - Any persist error.
pub async fn save_entry(
    coordinator: &PersistenceCoordinator,
    document: &Document,
    record_id: &str,
    entry_uuid: Uuid,
    values: &EntryValues,
) -> Result<(Document, Uuid), VaultError> {
    let mut next = document.clone();
    let entry = next
        .find_entry_mut(entry_uuid)
        .ok_or(VaultError::EntryNotFound(entry_uuid))?;
    update_entry(entry, values)?;

    coordinator.persist(&next, record_id).await?;
    tracing::debug!(%entry_uuid, "saved entry");
    Ok((next, entry_uuid))
}

/// Create an empty entry and persist. A group filter places it in that
/// group, otherwise it goes to the default group; a non-blank tag filter
/// becomes its only tag.
///
/// # Errors
///
/// - [`VaultError::GroupNotFound`] if a group filter does not resolve.
/// - Any persist error.
pub async fn create_entry(
    coordinator: &PersistenceCoordinator,
    document: &Document,
    record_id: &str,
    filter: &SelectFilter,
) -> Result<(Document, Uuid), VaultError> {
    let mut next = document.clone();
    let group = match filter {
        SelectFilter::Group(uuid) => *uuid,
        SelectFilter::All | SelectFilter::Tag(_) => next.default_group_uuid(),
    };

    let mut entry = Entry::new(model::new_uuid()?);
    if let SelectFilter::Tag(tag) = filter {
        if !query::normalize_tag(tag).is_empty() {
            entry.tags = vec![tag.clone()];
        }
    }
    let entry_uuid = entry.uuid;
    next.insert_entry(group, entry)?;

    coordinator.persist(&next, record_id).await?;
    tracing::debug!(%entry_uuid, %group, "created entry");
    Ok((next, entry_uuid))
}

/// Remove an entry and persist.
///
/// An entry outside the recycle bin moves into it (the bin is created when
/// enabled but missing). An entry already in the bin or one of its
/// subgroups, or any entry when the bin is disabled, is deleted and
/// tombstoned. Returns the bin UUID when the entry moved, `None` when it was
/// deleted.
///
/// # Errors
///
/// - [`VaultError::EntryNotFound`] if the entry does not resolve.
/// - Any persist error.
pub async fn remove_entry(
    coordinator: &PersistenceCoordinator,
    document: &Document,
    record_id: &str,
    entry_uuid: Uuid,
) -> Result<(Document, Option<Uuid>), VaultError> {
    let mut next = document.clone();
    if next.entry_location(entry_uuid).is_none() {
        return Err(VaultError::EntryNotFound(entry_uuid));
    }

    let bin = if next.is_recycled(entry_uuid) {
        None
    } else {
        next.ensure_recycle_bin()?
    };

    let mut entry = next
        .take_entry(entry_uuid)
        .ok_or(VaultError::EntryNotFound(entry_uuid))?;
    match bin {
        Some(bin) => {
            entry.times.relocated();
            next.insert_entry(bin, entry)?;
        }
        None => next.deleted_objects.push(DeletedObject {
            uuid: entry_uuid,
            deleted_at: model::times::now(),
        }),
    }

    coordinator.persist(&next, record_id).await?;
    tracing::debug!(%entry_uuid, recycled = bin.is_some(), "removed entry");
    Ok((next, bin))
}

/// Move an entry to the default group and persist. Returns the new document
/// and the destination group UUID.
///
/// # Errors
///
/// - [`VaultError::EntryNotFound`] if the entry does not resolve.
/// - Any persist error.
pub async fn restore_entry(
    coordinator: &PersistenceCoordinator,
    document: &Document,
    record_id: &str,
    entry_uuid: Uuid,
) -> Result<(Document, Uuid), VaultError> {
    let mut next = document.clone();
    let target = next.default_group_uuid();
    let mut entry = next
        .take_entry(entry_uuid)
        .ok_or(VaultError::EntryNotFound(entry_uuid))?;
    entry.times.relocated();
    next.insert_entry(target, entry)?;

    coordinator.persist(&next, record_id).await?;
    tracing::debug!(%entry_uuid, %target, "restored entry");
    Ok((next, target))
}
