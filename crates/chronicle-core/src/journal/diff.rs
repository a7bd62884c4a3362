//! Change sets: attribute diffs and keyed association diffs.
//!
//! A change set maps a key to an `[old, new]` pair. Scalar attributes use
//! the column name as key. Association rows use `<association>_<id>`, e.g.
//! `attachable_42` or `customizable_7`. `null` on either side means the
//! value or row did not exist at that end of the comparison.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::normalize::{is_blank, is_present, normalize_newlines};
use crate::model::journable::{Attachment, Attributes, CustomValue};
use crate::model::journal::{AttachableJournal, CustomizableJournal};

/// An `[old, new]` pair. Serializes as a two-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change(pub Value, pub Value);

impl Change {
    #[must_use]
    pub const fn old_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub const fn new_value(&self) -> &Value {
        &self.1
    }
}

/// Ordered map of change keys to value pairs.
pub type ChangeSet = BTreeMap<String, Change>;

// ---------------------------------------------------------------------------
// Scalar attributes
// ---------------------------------------------------------------------------

/// Which attribute names a scalar diff walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// Only names stored in the predecessor snapshot. Used when comparing a
    /// live entity to its last journal.
    Predecessor,
    /// Names from either side. Used when comparing two stored journals.
    Union,
}

/// Diff two attribute maps after newline normalization.
///
/// A missing name reads as `null`. Pairs where both sides are blank are
/// never reported, so `null -> ""` is not a change.
#[must_use]
pub fn diff_attributes(predecessor: &Attributes, current: &Attributes, scope: KeyScope) -> ChangeSet {
    let predecessor = normalize_newlines(predecessor);
    let current = normalize_newlines(current);

    let mut names: Vec<&String> = predecessor.keys().collect();
    if scope == KeyScope::Union {
        names.extend(current.keys().filter(|k| !predecessor.contains_key(*k)));
    }

    let mut changes = ChangeSet::new();
    for name in names {
        let old = predecessor.get(name).unwrap_or(&Value::Null);
        let new = current.get(name).unwrap_or(&Value::Null);
        if old != new && (is_present(old) || is_present(new)) {
            changes.insert(name.clone(), Change(old.clone(), new.clone()));
        }
    }
    changes
}

// ---------------------------------------------------------------------------
// Keyed associations
// ---------------------------------------------------------------------------

/// The two journaled association tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Association {
    /// Attachments, keyed by attachment id, compared by filename.
    Attachable,
    /// Custom values, keyed by custom field id, compared by value.
    Customizable,
}

impl Association {
    /// Prefix of the change keys this association produces.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Attachable => "attachable",
            Self::Customizable => "customizable",
        }
    }

    /// Change key for one row, e.g. `attachable_42`.
    #[must_use]
    pub fn change_key(self, key: i64) -> String {
        format!("{}_{key}", self.prefix())
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One row of an association snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationRow {
    pub key: i64,
    pub value: Value,
}

impl AssociationRow {
    pub const fn new(key: i64, value: Value) -> Self {
        Self { key, value }
    }
}

/// How one key differs between two association snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Added,
    Removed,
    Changed,
    Unchanged,
}

/// The value a key has on each side of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRow<'a> {
    pub predecessor: Option<&'a Value>,
    pub current: Option<&'a Value>,
}

impl MergedRow<'_> {
    #[must_use]
    pub fn classify(&self) -> RowChange {
        match (self.predecessor, self.current) {
            (None, Some(_)) => RowChange::Added,
            (Some(_), None) => RowChange::Removed,
            (Some(old), Some(new)) if old != new => RowChange::Changed,
            _ => RowChange::Unchanged,
        }
    }

    fn change(&self) -> Option<Change> {
        match self.classify() {
            RowChange::Unchanged => None,
            _ => Some(Change(
                self.predecessor.cloned().unwrap_or(Value::Null),
                self.current.cloned().unwrap_or(Value::Null),
            )),
        }
    }
}

/// Union the keys of both snapshots and pair up their values.
///
/// When a key occurs more than once on one side, the first row wins.
#[must_use]
pub fn merge_by_key<'a>(
    predecessor: &'a [AssociationRow],
    current: &'a [AssociationRow],
) -> BTreeMap<i64, MergedRow<'a>> {
    let empty = MergedRow {
        predecessor: None,
        current: None,
    };
    let mut merged: BTreeMap<i64, MergedRow<'a>> = BTreeMap::new();

    for row in predecessor {
        let slot = merged.entry(row.key).or_insert(empty);
        if slot.predecessor.is_none() {
            slot.predecessor = Some(&row.value);
        }
    }
    for row in current {
        let slot = merged.entry(row.key).or_insert(empty);
        if slot.current.is_none() {
            slot.current = Some(&row.value);
        }
    }

    merged
}

/// Diff two snapshots of one association.
///
/// Rows with a blank value are dropped on both sides first: a blank value
/// means the association does not exist.
#[must_use]
pub fn diff_association(
    association: Association,
    predecessor: &[AssociationRow],
    current: &[AssociationRow],
) -> ChangeSet {
    let predecessor = without_blank_values(predecessor);
    let current = without_blank_values(current);

    merge_by_key(&predecessor, &current)
        .into_iter()
        .filter_map(|(key, merged)| {
            merged
                .change()
                .map(|change| (association.change_key(key), change))
        })
        .collect()
}

fn without_blank_values(rows: &[AssociationRow]) -> Vec<AssociationRow> {
    rows.iter().filter(|r| !is_blank(&r.value)).cloned().collect()
}

// ---------------------------------------------------------------------------
// Row sources
// ---------------------------------------------------------------------------

/// Live attachments keyed by attachment id.
#[must_use]
pub fn attachment_rows(attachments: &[Attachment]) -> Vec<AssociationRow> {
    attachments
        .iter()
        .map(|a| AssociationRow::new(a.id, Value::String(a.filename.clone())))
        .collect()
}

/// Live custom values keyed by custom field id.
#[must_use]
pub fn custom_value_rows(values: &[CustomValue]) -> Vec<AssociationRow> {
    values
        .iter()
        .map(|cv| AssociationRow::new(cv.custom_field_id, optional_string(cv.value.as_deref())))
        .collect()
}

/// Journaled attachments keyed by attachment id.
#[must_use]
pub fn attachable_rows(rows: &[AttachableJournal]) -> Vec<AssociationRow> {
    rows.iter()
        .map(|r| AssociationRow::new(r.attachment_id, Value::String(r.filename.clone())))
        .collect()
}

/// Journaled custom values keyed by custom field id.
#[must_use]
pub fn customizable_rows(rows: &[CustomizableJournal]) -> Vec<AssociationRow> {
    rows.iter()
        .map(|r| AssociationRow::new(r.custom_field_id, optional_string(r.value.as_deref())))
        .collect()
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}
