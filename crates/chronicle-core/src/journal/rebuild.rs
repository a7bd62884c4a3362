//! Repairing or re-materializing the initial journal of an entity.
//!
//! Used by backfills and consistency repair. The rebuilt journal keeps its
//! id, version, user and timestamp; its snapshot and association rows are
//! replaced from the entity's live state.

use super::JournalManager;
use super::normalize::normalize_newlines;
use super::record::{attachable_journals, create_journal_data, customizable_journals};
use crate::db::{atomically, store};
use crate::error::JournalError;
use crate::model::journable::{Attributes, Journalable};
use crate::model::journal::Journal;

impl JournalManager<'_> {
    /// Rewrite `journal` from `changed_data` and the entity's current
    /// association state.
    ///
    /// Without a snapshot record one is created; with one, it is overwritten
    /// wholesale. Association rows are always deleted and rebuilt, never
    /// merged, so repeating the call on an unchanged entity stores identical
    /// rows.
    ///
    /// # Errors
    ///
    /// - [`JournalError::UnknownJournableType`] for unregistered types
    /// - [`JournalError::JournalNotFound`] when `journal` belongs to another
    ///   entity or no longer exists
    /// - a storage error
    pub fn recreate_initial_journal<E: Journalable + ?Sized>(
        &self,
        entity: &E,
        journal: &Journal,
        changed_data: &Attributes,
    ) -> Result<Journal, JournalError> {
        let schema = self.registry.resolve(entity.type_name())?;
        if journal.journable_type != schema.base_type()
            || journal.journable_id != entity.journable_id()
        {
            return Err(JournalError::JournalNotFound(format!(
                "journal {} does not belong to {} #{}",
                journal.id,
                schema.base_type(),
                entity.journable_id()
            )));
        }

        let mut changed_data = changed_data.clone();
        changed_data.remove("id");
        let data = create_journal_data(schema, &schema.filter(&normalize_newlines(&changed_data)));
        let created = journal.data.is_none();

        atomically(self.conn, |conn| {
            store::upsert_data(conn, journal.id, &data)?;
            let removed = store::delete_association_rows(conn, journal.id)?;
            store::insert_association_rows(
                conn,
                journal.id,
                &attachable_journals(entity),
                &customizable_journals(entity),
            )?;
            tracing::debug!(
                journal_id = journal.id,
                snapshot_created = created,
                association_rows_removed = removed,
                "recreated journal"
            );
            Ok(())
        })?;

        self.reload(journal.id)
    }

    /// Recreate version 1 of `entity` from its live attributes.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::JournalNotFound`] when the entity has no
    /// initial journal, plus the errors of
    /// [`JournalManager::recreate_initial_journal`].
    pub fn rebuild_initial_journal<E: Journalable + ?Sized>(
        &self,
        entity: &E,
    ) -> Result<Journal, JournalError> {
        let base = self.registry.base_type(entity.type_name())?;
        let initial = store::find_by_version(self.conn, base, entity.journable_id(), 1)?
            .ok_or_else(|| {
                JournalError::JournalNotFound(format!(
                    "{base} #{} has no initial journal",
                    entity.journable_id()
                ))
            })?;
        self.recreate_initial_journal(entity, &initial, &entity.attributes())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::open_in_memory;
    use crate::error::JournalError;
    use crate::journal::registry::JournalRegistry;
    use crate::journal::{FixedUser, JournalManager};
    use crate::model::journable::{Attachment, CustomValue, EntitySnapshot, Journalable};
    use serde_json::json;

    fn wiki() -> EntitySnapshot {
        EntitySnapshot::new("WikiContent", 3, "wiki_edits")
            .with_attribute("id", 3)
            .with_attribute("page_id", 1)
            .with_attribute("text", "h1. Home")
            .with_attachments(vec![Attachment {
                id: 11,
                filename: "diagram.svg".into(),
            }])
            .with_custom_values(vec![CustomValue {
                custom_field_id: 2,
                value: Some("public".into()),
            }])
    }

    #[test]
    fn missing_snapshot_is_materialized() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let journal = manager
            .add_journal(&wiki(), &FixedUser(1), "")
            .expect("v1");
        conn.execute("DELETE FROM journal_data WHERE journal_id = ?1", [journal.id])
            .expect("drop snapshot");
        let broken = manager.reload(journal.id).expect("reload");
        assert!(broken.data.is_none());

        let repaired = manager
            .recreate_initial_journal(&wiki(), &broken, &wiki().attributes())
            .expect("recreate");
        let data = repaired.data.expect("snapshot rebuilt");
        assert_eq!(data.get("text"), Some(&json!("h1. Home")));
        assert!(data.get("id").is_none());
        assert_eq!(repaired.attachable_journals.len(), 1);
    }

    #[test]
    fn rows_are_replaced_not_merged() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        manager.add_journal(&wiki(), &FixedUser(1), "").expect("v1");

        let moved = wiki().with_attachments(vec![Attachment {
            id: 12,
            filename: "diagram-v2.svg".into(),
        }]);
        let rebuilt = manager.rebuild_initial_journal(&moved).expect("rebuild");

        let ids: Vec<i64> = rebuilt
            .attachable_journals
            .iter()
            .map(|a| a.attachment_id)
            .collect();
        assert_eq!(ids, [12]);
        assert_eq!(rebuilt.version, 1);
    }

    #[test]
    fn rebuild_is_idempotent() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        manager.add_journal(&wiki(), &FixedUser(1), "").expect("v1");

        let first = manager.rebuild_initial_journal(&wiki()).expect("first");
        let second = manager.rebuild_initial_journal(&wiki()).expect("second");

        assert_eq!(first.data, second.data);
        assert_eq!(first.attachable_journals, second.attachable_journals);
        assert_eq!(first.customizable_journals, second.customizable_journals);
    }

    #[test]
    fn entity_without_journals_cannot_be_rebuilt() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let err = manager
            .rebuild_initial_journal(&wiki())
            .expect_err("nothing to rebuild");
        assert!(matches!(err, JournalError::JournalNotFound(_)));
    }

    #[test]
    fn foreign_journal_is_rejected() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        let other = EntitySnapshot::new("WikiContent", 99, "wiki_edits");
        let journal = manager.add_journal(&other, &FixedUser(1), "").expect("v1");

        let err = manager
            .recreate_initial_journal(&wiki(), &journal, &wiki().attributes())
            .expect_err("wrong entity");
        assert!(matches!(err, JournalError::JournalNotFound(_)));
    }
}
