//! Building and persisting the next journal of an entity.

use serde_json::Value;

use super::normalize::normalize_newlines;
use super::registry::SnapshotSchema;
use super::{CurrentUser, JournalManager};
use crate::db::{atomically, store};
use crate::error::JournalError;
use crate::model::journable::{Attributes, Journalable};
use crate::model::journal::{
    AttachableJournal, CustomizableJournal, Journal, JournalData, NewJournal,
};

/// Journal fields supplied by the caller of [`JournalManager::create_journal`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalAttributes {
    pub version: u32,
    pub activity_type: String,
    /// Column values to snapshot, as a change context holds them. A
    /// two-element array value is read as an `[old, new]` pair and only
    /// `new` is stored.
    pub changed_data: Attributes,
    /// Acting user; the `CurrentUser` passed alongside is used when `None`.
    pub user_id: Option<i64>,
}

impl JournalManager<'_> {
    /// Record the next journal of `entity` from its current state.
    ///
    /// The version is the entity's journal count plus one. The journal, its
    /// snapshot and its association rows are written as one unit; if the
    /// version was taken concurrently the whole write is rolled back.
    ///
    /// # Errors
    ///
    /// - [`JournalError::UnknownJournableType`] for unregistered types
    /// - [`JournalError::VersionCollision`] when the version already exists
    /// - a storage error for any other write failure
    pub fn add_journal<E: Journalable + ?Sized>(
        &self,
        entity: &E,
        user: &dyn CurrentUser,
        notes: &str,
    ) -> Result<Journal, JournalError> {
        let schema = self.registry.resolve(entity.type_name())?;

        let journal_id = atomically(self.conn, |conn| {
            let version =
                store::count_journals(conn, schema.base_type(), entity.journable_id())? + 1;
            let attributes = JournalAttributes {
                version,
                activity_type: entity.activity_type().to_string(),
                changed_data: entity.attributes(),
                user_id: None,
            };
            let journal = self.build_journal(entity, attributes, user, notes)?;
            store::insert_journal(conn, &journal, now_us())
        })?;

        let journal = self.reload(journal_id)?;
        tracing::debug!(
            journal_id,
            journable_type = %journal.journable_type,
            journable_id = journal.journable_id,
            version = journal.version,
            user_id = journal.user_id,
            "recorded journal"
        );
        Ok(journal)
    }

    /// Record a journal only if [`JournalManager::changed`] says one is
    /// warranted. This is the save-hook path.
    ///
    /// # Errors
    ///
    /// See [`JournalManager::add_journal`].
    pub fn record_if_changed<E: Journalable + ?Sized>(
        &self,
        entity: &E,
        user: &dyn CurrentUser,
        notes: &str,
    ) -> Result<Option<Journal>, JournalError> {
        if !self.changed(entity)? {
            tracing::debug!(
                journable_type = entity.type_name(),
                journable_id = entity.journable_id(),
                "no recordable change"
            );
            return Ok(None);
        }
        self.add_journal(entity, user, notes).map(Some)
    }

    /// Build, without writing, a journal for `entity` from explicit
    /// attributes. Pair values in `changed_data` contribute their new side.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::UnknownJournableType`] for unregistered types.
    pub fn create_journal<E: Journalable + ?Sized>(
        &self,
        entity: &E,
        attributes: JournalAttributes,
        user: &dyn CurrentUser,
        notes: &str,
    ) -> Result<NewJournal, JournalError> {
        let changed_data = new_values(&attributes.changed_data);
        self.build_journal(
            entity,
            JournalAttributes {
                changed_data,
                ..attributes
            },
            user,
            notes,
        )
    }

    /// Build a journal whose `changed_data` already holds plain column
    /// values. Live entity state takes this path, so an array-valued column
    /// is stored as is.
    fn build_journal<E: Journalable + ?Sized>(
        &self,
        entity: &E,
        attributes: JournalAttributes,
        user: &dyn CurrentUser,
        notes: &str,
    ) -> Result<NewJournal, JournalError> {
        let schema = self.registry.resolve(entity.type_name())?;
        let changed_data = normalize_newlines(&attributes.changed_data);

        Ok(NewJournal {
            journable_id: entity.journable_id(),
            journable_type: schema.base_type().to_string(),
            version: attributes.version,
            user_id: attributes.user_id.unwrap_or_else(|| user.user_id()),
            notes: notes.to_string(),
            activity_type: attributes.activity_type,
            data: create_journal_data(schema, &schema.filter(&changed_data)),
            attachable_journals: attachable_journals(entity),
            customizable_journals: customizable_journals(entity),
        })
    }

    /// Write a built journal as one unit and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::VersionCollision`] when the version already
    /// exists, or a storage error.
    pub fn save_journal(&self, journal: &NewJournal) -> Result<Journal, JournalError> {
        let journal_id = atomically(self.conn, |conn| {
            store::insert_journal(conn, journal, now_us())
        })?;
        self.reload(journal_id)
    }

    /// Every journal of an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered types or a storage failure.
    pub fn journals<E: Journalable + ?Sized>(&self, entity: &E) -> Result<Vec<Journal>, JournalError> {
        let base = self.registry.base_type(entity.type_name())?;
        store::list_journals(self.conn, base, entity.journable_id())
    }

    /// Drop every journal of an entity that is being destroyed. Snapshot
    /// and association rows go with them. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error for unregistered types or a storage failure.
    pub fn delete_journals_for<E: Journalable + ?Sized>(&self, entity: &E) -> Result<usize, JournalError> {
        let base = self.registry.base_type(entity.type_name())?;
        let removed = store::delete_journals_for(self.conn, base, entity.journable_id())?;
        tracing::debug!(
            journable_type = base,
            journable_id = entity.journable_id(),
            removed,
            "deleted journals"
        );
        Ok(removed)
    }

    pub(crate) fn reload(&self, journal_id: i64) -> Result<Journal, JournalError> {
        store::find_journal(self.conn, journal_id)?
            .ok_or_else(|| JournalError::JournalNotFound(format!("id {journal_id}")))
    }
}

/// Snapshot record for `schema` from already filtered column values.
#[must_use]
pub fn create_journal_data(schema: &SnapshotSchema, changed_data: &Attributes) -> JournalData {
    JournalData::new(schema.data_type().to_string(), changed_data.clone())
}

/// Collapse `[old, new]` pairs to their new side; other values pass through.
fn new_values(changed_data: &Attributes) -> Attributes {
    changed_data
        .iter()
        .map(|(name, value)| {
            let value = match value {
                Value::Array(pair) if pair.len() == 2 => pair[1].clone(),
                other => other.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

/// One row per attachment currently on the entity.
pub(crate) fn attachable_journals<E: Journalable + ?Sized>(entity: &E) -> Vec<AttachableJournal> {
    entity
        .attachments()
        .unwrap_or_default()
        .iter()
        .map(|a| AttachableJournal {
            attachment_id: a.id,
            filename: a.filename.clone(),
        })
        .collect()
}

/// One row per non-blank custom value. Blank values are skipped so that an
/// empty value and a missing one journal identically.
pub(crate) fn customizable_journals<E: Journalable + ?Sized>(entity: &E) -> Vec<CustomizableJournal> {
    entity
        .custom_values()
        .unwrap_or_default()
        .iter()
        .filter(|cv| cv.value.as_deref().is_some_and(|v| !v.trim().is_empty()))
        .map(|cv| CustomizableJournal {
            custom_field_id: cv.custom_field_id,
            value: cv.value.clone(),
        })
        .collect()
}

fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
