//! Read-only change detection against the latest journal.

use super::JournalManager;
use super::diff::{
    Association, ChangeSet, KeyScope, attachable_rows, attachment_rows, custom_value_rows,
    customizable_rows, diff_association, diff_attributes,
};
use super::registry::SnapshotSchema;
use crate::db::store;
use crate::error::JournalError;
use crate::model::journable::{Attributes, Journalable};
use crate::model::journal::Journal;

impl JournalManager<'_> {
    /// Whether `entity` differs from its last journal in any recorded way.
    ///
    /// An entity without journals always needs one. A last journal whose
    /// snapshot is missing or unreadable is treated the same way.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::UnknownJournableType`] for unregistered types,
    /// or a storage error.
    pub fn changed<E: Journalable + ?Sized>(&self, entity: &E) -> Result<bool, JournalError> {
        let schema = self.registry.resolve(entity.type_name())?;
        let latest = store::latest_journal(self.conn, schema.base_type(), entity.journable_id())?;

        match latest {
            None => Ok(true),
            Some(journal) if journal.data.is_none() => {
                tracing::warn!(
                    journal_id = journal.id,
                    journable_type = %journal.journable_type,
                    journable_id = journal.journable_id,
                    "latest journal has no snapshot; treating entity as unjournaled"
                );
                Ok(true)
            }
            Some(journal) => Ok(!pending_changes(schema, Some(&journal), entity).is_empty()),
        }
    }

    /// The change set a journal recorded now would carry, relative to the
    /// latest journal. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::UnknownJournableType`] for unregistered types,
    /// or a storage error.
    pub fn entity_changes<E: Journalable + ?Sized>(
        &self,
        entity: &E,
    ) -> Result<ChangeSet, JournalError> {
        let schema = self.registry.resolve(entity.type_name())?;
        let latest = store::latest_journal(self.conn, schema.base_type(), entity.journable_id())?;
        Ok(pending_changes(schema, latest.as_ref(), entity))
    }
}

/// Diff the live entity against `predecessor`.
///
/// Scalars are compared over the predecessor's stored names. Associations
/// are compared only for capabilities the entity has; a missing capability
/// contributes nothing. A predecessor without a snapshot counts as none.
pub(crate) fn pending_changes<E: Journalable + ?Sized>(
    schema: &SnapshotSchema,
    predecessor: Option<&Journal>,
    entity: &E,
) -> ChangeSet {
    let predecessor = predecessor.filter(|journal| journal.data.is_some());
    let current = schema.filter(&entity.attributes());

    let mut changes = match predecessor.and_then(|journal| journal.data.as_ref()) {
        Some(data) => diff_attributes(data.journaled_attributes(), &current, KeyScope::Predecessor),
        None => diff_attributes(&Attributes::new(), &current, KeyScope::Union),
    };

    if let Some(attachments) = entity.attachments() {
        let old = predecessor.map(|j| attachable_rows(&j.attachable_journals));
        changes.extend(diff_association(
            Association::Attachable,
            &old.unwrap_or_default(),
            &attachment_rows(attachments),
        ));
    }

    if let Some(values) = entity.custom_values() {
        let old = predecessor.map(|j| customizable_rows(&j.customizable_journals));
        changes.extend(diff_association(
            Association::Customizable,
            &old.unwrap_or_default(),
            &custom_value_rows(values),
        ));
    }

    changes
}

#[cfg(test)]
mod tests {
    use crate::db::open_in_memory;
    use crate::journal::registry::JournalRegistry;
    use crate::journal::{FixedUser, JournalManager};
    use crate::model::journable::{Attachment, CustomValue, EntitySnapshot};
    use serde_json::{Value, json};

    fn work_package() -> EntitySnapshot {
        EntitySnapshot::new("WorkPackage", 1, "work_packages")
            .with_attribute("subject", "Login fails")
            .with_attribute("description", Value::Null)
            .with_attribute("status_id", 1)
            .with_attachments(vec![Attachment {
                id: 5,
                filename: "a.png".into(),
            }])
            .with_custom_values(vec![CustomValue {
                custom_field_id: 1,
                value: Some("MySQL".into()),
            }])
    }

    #[test]
    fn new_entity_is_always_changed() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let entity = EntitySnapshot::new("WorkPackage", 1, "work_packages")
            .with_attribute("subject", "x");
        assert!(manager.changed(&entity).expect("detect"));
    }

    #[test]
    fn unchanged_entity_after_journal() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        let entity = work_package();

        manager
            .add_journal(&entity, &FixedUser(1), "")
            .expect("initial journal");
        assert!(!manager.changed(&entity).expect("detect"));
        assert!(manager.entity_changes(&entity).expect("diff").is_empty());
    }

    #[test]
    fn blank_to_blank_and_unknown_columns_are_ignored() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        let entity = work_package();
        manager
            .add_journal(&entity, &FixedUser(1), "")
            .expect("initial journal");

        let edited = entity
            .with_attribute("description", "")
            .with_attribute("updated_at", "2014-05-01T10:00:00Z")
            .with_attribute("not_a_column", 7);
        assert!(!manager.changed(&edited).expect("detect"));
    }

    #[test]
    fn each_change_source_is_detected() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        let entity = work_package();
        manager
            .add_journal(&entity, &FixedUser(1), "")
            .expect("initial journal");

        let scalar = entity.clone().with_attribute("status_id", 2);
        assert!(manager.changed(&scalar).expect("scalar"));

        let attachments = entity.clone().with_attachments(vec![]);
        let changes = manager.entity_changes(&attachments).expect("attachments");
        assert_eq!(changes["attachable_5"].old_value(), &json!("a.png"));

        let custom = entity.with_custom_values(vec![CustomValue {
            custom_field_id: 1,
            value: Some("PostgreSQL".into()),
        }]);
        let changes = manager.entity_changes(&custom).expect("custom values");
        assert_eq!(changes["customizable_1"].new_value(), &json!("PostgreSQL"));
    }

    #[test]
    fn missing_capability_contributes_no_rows() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);
        let entity = work_package();
        manager
            .add_journal(&entity, &FixedUser(1), "")
            .expect("initial journal");

        let mut without = entity;
        without.attachments = None;
        without.custom_values = None;
        assert!(!manager.changed(&without).expect("detect"));
    }

    #[test]
    fn detection_writes_nothing() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        manager.changed(&work_package()).expect("detect");
        manager.entity_changes(&work_package()).expect("diff");
        let journals: i64 = conn
            .query_row("SELECT COUNT(*) FROM journals", [], |row| row.get(0))
            .expect("count");
        assert_eq!(journals, 0);
    }

    #[test]
    fn unknown_type_is_fatal() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let entity = EntitySnapshot::new("Sprint", 1, "sprints");
        assert!(manager.changed(&entity).is_err());
    }
}
