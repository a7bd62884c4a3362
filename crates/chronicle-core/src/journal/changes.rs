//! Change sets between stored journals, for activity feeds and mail bodies.

use serde::Serialize;

use super::JournalManager;
use super::diff::{
    Association, ChangeSet, KeyScope, attachable_rows, customizable_rows, diff_association,
    diff_attributes,
};
use crate::db::store;
use crate::error::JournalError;
use crate::model::journable::Attributes;
use crate::model::journal::{Journal, JournalData};

/// A journal together with what it changed relative to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalChanges {
    pub journal: Journal,
    pub changes: ChangeSet,
}

impl JournalManager<'_> {
    /// What `journal` changed relative to the journal one version earlier.
    ///
    /// The initial journal, or one whose predecessor lost its snapshot, is
    /// diffed against nothing: every present value shows as `[null, value]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the predecessor cannot be queried.
    pub fn journal_changes(&self, journal: &Journal) -> Result<ChangeSet, JournalError> {
        let predecessor = if journal.version > 1 {
            store::find_by_version(
                self.conn,
                &journal.journable_type,
                journal.journable_id,
                journal.version - 1,
            )?
        } else {
            None
        };
        Ok(diff_journals(predecessor.as_ref(), journal))
    }

    /// Full history of one entity with per-journal change sets.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered types or a storage failure.
    pub fn history(
        &self,
        type_name: &str,
        journable_id: i64,
    ) -> Result<Vec<JournalChanges>, JournalError> {
        let base = self.registry.base_type(type_name)?;
        let journals = store::list_journals(self.conn, base, journable_id)?;

        let mut entries = Vec::with_capacity(journals.len());
        let mut predecessor: Option<&Journal> = None;
        for journal in &journals {
            let adjacent = predecessor.filter(|p| p.version + 1 == journal.version);
            entries.push(JournalChanges {
                journal: journal.clone(),
                changes: diff_journals(adjacent, journal),
            });
            predecessor = Some(journal);
        }
        Ok(entries)
    }
}

/// Diff two stored snapshots. A missing predecessor, or one without data,
/// is an empty snapshot.
#[must_use]
pub fn diff_journals(predecessor: Option<&Journal>, journal: &Journal) -> ChangeSet {
    let empty = Attributes::new();
    let predecessor = predecessor.filter(|p| p.data.is_some());
    if journal.data.is_none() {
        tracing::warn!(
            journal_id = journal.id,
            "journal has no snapshot; attribute changes cannot be shown"
        );
    }

    let old = predecessor
        .and_then(|p| p.data.as_ref())
        .map_or(&empty, JournalData::journaled_attributes);
    let new = journal
        .data
        .as_ref()
        .map_or(&empty, JournalData::journaled_attributes);

    let mut changes = diff_attributes(old, new, KeyScope::Union);
    changes.extend(diff_association(
        Association::Attachable,
        &predecessor
            .map(|p| attachable_rows(&p.attachable_journals))
            .unwrap_or_default(),
        &attachable_rows(&journal.attachable_journals),
    ));
    changes.extend(diff_association(
        Association::Customizable,
        &predecessor
            .map(|p| customizable_rows(&p.customizable_journals))
            .unwrap_or_default(),
        &customizable_rows(&journal.customizable_journals),
    ));
    changes
}
