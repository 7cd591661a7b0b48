//! Read-only queries over a [`Document`].
//!
//! - [`all_groups`]: pre-order flattening of group trees
//! - [`split_recycle_bin`]: separate the recycle bin from every other group
//! - [`entries_for_list`]: entries selected by [`SelectFilter`]
//! - [`normalize_tag`], [`entry_tags`], [`all_tags`]: tag universe
//! - [`filter_by_search`], [`sort_entries`]: list refinement, never in place
//!
//! Absence is not an error here: lookups return `Option` or empty lists.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::entry::TITLE;
use crate::model::{Document, Entry, Group};

/// Which entries a list shows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SelectFilter {
    /// Every entry outside the recycle bin.
    #[default]
    All,
    /// Direct entries of one group (the recycle bin included).
    Group(Uuid),
    /// Entries outside the recycle bin carrying the tag.
    Tag(String),
}

/// List orderings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    NameAsc,
    NameDesc,
    DateAsc,
    DateDesc,
}

/// Groups split around the recycle bin.
#[derive(Debug)]
pub struct GroupPartition<'a> {
    /// Every group except the recycle bin, pre-order.
    pub groups: Vec<&'a Group>,
    /// The recycle-bin group, when designated and present.
    pub recycle_bin: Option<&'a Group>,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Flatten `groups` depth-first: each group, then its children, before the
/// next sibling.
#[must_use]
pub fn all_groups<'a>(groups: &[&'a Group]) -> Vec<&'a Group> {
    fn visit<'a>(group: &'a Group, out: &mut Vec<&'a Group>) {
        out.push(group);
        for child in &group.groups {
            visit(child, out);
        }
    }

    let mut out = Vec::new();
    for group in groups {
        visit(group, &mut out);
    }
    out
}

/// Split the document's groups into the recycle bin and the rest.
#[must_use]
pub fn split_recycle_bin(document: &Document) -> GroupPartition<'_> {
    let bin = document.meta.recycle_bin_uuid;
    let mut partition = GroupPartition {
        groups: Vec::new(),
        recycle_bin: None,
    };
    for group in all_groups(&[&document.root]) {
        if Some(group.uuid) == bin {
            partition.recycle_bin = Some(group);
        } else {
            partition.groups.push(group);
        }
    }
    partition
}

/// Whether the entry sits in the recycle-bin group or one of its subgroups.
#[must_use]
pub fn is_entry_in_recycle_bin(document: &Document, entry: &Entry) -> bool {
    document.is_recycled(entry.uuid)
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

fn visible_entries(document: &Document) -> Vec<&Entry> {
    split_recycle_bin(document)
        .groups
        .into_iter()
        .flat_map(|group| group.entries.iter())
        .collect()
}

/// Entries selected by `filter`.
///
/// A group that no longer resolves yields an empty list. A blank tag selects
/// the same entries as [`SelectFilter::All`].
#[must_use]
pub fn entries_for_list<'a>(document: &'a Document, filter: &SelectFilter) -> Vec<&'a Entry> {
    match filter {
        SelectFilter::Group(uuid) => document
            .find_group(*uuid)
            .map(|group| group.entries.iter().collect())
            .unwrap_or_default(),
        SelectFilter::All => visible_entries(document),
        SelectFilter::Tag(tag) => {
            let wanted = normalize_tag(tag);
            let entries = visible_entries(document);
            if wanted.is_empty() {
                return entries;
            }
            entries
                .into_iter()
                .filter(|entry| entry.tags.iter().any(|t| normalize_tag(t) == wanted))
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Trim and lowercase a tag.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// An entry's tags, normalized, in stored order.
#[must_use]
pub fn entry_tags(entry: &Entry) -> Vec<String> {
    entry.tags.iter().map(|tag| normalize_tag(tag)).collect()
}

/// Distinct non-blank normalized tags of every entry outside the recycle bin,
/// in first-seen order.
#[must_use]
pub fn all_tags(document: &Document) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in visible_entries(document).into_iter().flat_map(entry_tags) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

// ---------------------------------------------------------------------------
// Search and sort
// ---------------------------------------------------------------------------

/// Entries whose title contains `query`, case-insensitively.
///
/// A blank query returns the input unchanged.
#[must_use]
pub fn filter_by_search<'a>(entries: &[&'a Entry], query: &str) -> Vec<&'a Entry> {
    let needle = normalize_tag(query);
    if needle.is_empty() {
        return entries.to_vec();
    }
    entries
        .iter()
        .filter(|entry| normalize_tag(&entry.field_text(TITLE)).contains(&needle))
        .copied()
        .collect()
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// A sorted copy of `entries`. The input order is left untouched.
///
/// Entries without a last-modification time sort as the earliest instant.
#[must_use]
pub fn sort_entries<'a>(entries: &[&'a Entry], order: SortOrder) -> Vec<&'a Entry> {
    let mut sorted = entries.to_vec();
    match order {
        SortOrder::NameAsc => {
            sorted.sort_by(|a, b| compare_names(&a.field_text(TITLE), &b.field_text(TITLE)));
        }
        SortOrder::NameDesc => {
            sorted.sort_by(|a, b| compare_names(&b.field_text(TITLE), &a.field_text(TITLE)));
        }
        SortOrder::DateAsc => {
            sorted.sort_by_key(|entry| entry.times.last_modification);
        }
        SortOrder::DateDesc => {
            sorted.sort_by(|a, b| b.times.last_modification.cmp(&a.times.last_modification));
        }
    }
    sorted
}
