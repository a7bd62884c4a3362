//! Reassigning user references inside historical journals.
//!
//! When an account is deleted or merged, every journal snapshot that names
//! it (as author, assignee, ...) and every journal it acted on must point at
//! a substitute. Journals are walked in ascending id order in bounded
//! batches. The cursor is the largest id seen so far and is re-queried each
//! batch, so journals appended while the walk runs are still visited. Each
//! batch commits on its own; stopping between batches is safe.

use serde::Serialize;
use serde_json::Value;

use super::JournalManager;
use crate::config::DEFAULT_USER_BATCH_SIZE;
use crate::db::{atomically, store};
use crate::error::JournalError;
use crate::model::journal::Journal;

/// Snapshot columns that hold user ids.
pub const USER_REFERENCE_COLUMNS: &[&str] =
    &["author_id", "user_id", "assigned_to_id", "responsible_id"];

/// Outcome of a user reference migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserReassignmentStats {
    /// Number of non-empty batches processed.
    pub batches: usize,
    /// Journals examined.
    pub scanned: usize,
    /// Journals written because a reference was replaced.
    pub rewritten: usize,
}

/// Outcome of one committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserReassignmentBatch {
    /// Largest journal id in the batch.
    pub cursor: i64,
    pub scanned: usize,
    pub rewritten: usize,
}

impl JournalManager<'_> {
    /// Replace `current_user_id` with `substitute_id` across all journals,
    /// in batches of [`DEFAULT_USER_BATCH_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns a storage error; batches committed before the failure stay
    /// committed.
    pub fn update_user_references(
        &self,
        current_user_id: i64,
        substitute_id: i64,
    ) -> Result<UserReassignmentStats, JournalError> {
        self.update_user_references_in_batches(
            current_user_id,
            substitute_id,
            DEFAULT_USER_BATCH_SIZE,
        )
    }

    /// [`JournalManager::update_user_references`] with an explicit batch size.
    ///
    /// # Errors
    ///
    /// Returns a storage error; batches committed before the failure stay
    /// committed.
    pub fn update_user_references_in_batches(
        &self,
        current_user_id: i64,
        substitute_id: i64,
        batch_size: usize,
    ) -> Result<UserReassignmentStats, JournalError> {
        let mut stats = UserReassignmentStats::default();
        let mut cursor = 0_i64;

        while let Some(batch) =
            self.reassign_user_batch(current_user_id, substitute_id, cursor, batch_size)?
        {
            stats.batches += 1;
            stats.scanned += batch.scanned;
            stats.rewritten += batch.rewritten;
            cursor = batch.cursor;

            tracing::info!(
                batch = stats.batches,
                cursor,
                scanned = batch.scanned,
                rewritten = batch.rewritten,
                "reassigned user references"
            );
        }

        tracing::info!(
            from = current_user_id,
            to = substitute_id,
            scanned = stats.scanned,
            rewritten = stats.rewritten,
            "user reference migration finished"
        );
        Ok(stats)
    }

    /// Process the next batch of at most `batch_size` journals with an id
    /// above `after_id`, committing it as one unit.
    ///
    /// Returns `None` once no journal lies past the cursor. The returned
    /// cursor is the largest id in the batch; pass it back to continue.
    ///
    /// # Errors
    ///
    /// Returns a storage error; the failing batch is rolled back.
    pub fn reassign_user_batch(
        &self,
        current_user_id: i64,
        substitute_id: i64,
        after_id: i64,
        batch_size: usize,
    ) -> Result<Option<UserReassignmentBatch>, JournalError> {
        let mut batch = store::journals_after(self.conn, after_id, batch_size.max(1))?;
        let Some(cursor) = batch.iter().map(|j| j.id).max() else {
            return Ok(None);
        };

        let rewritten = atomically(self.conn, |conn| {
            let mut rewritten = 0;
            for journal in &mut batch {
                let change = reassign(journal, current_user_id, substitute_id);
                if change.data {
                    if let Some(data) = &journal.data {
                        store::upsert_data(conn, journal.id, data)?;
                    }
                }
                if change.user {
                    store::update_journal_user(conn, journal.id, substitute_id)?;
                }
                if change.data || change.user {
                    rewritten += 1;
                }
            }
            Ok(rewritten)
        })?;

        Ok(Some(UserReassignmentBatch {
            cursor,
            scanned: batch.len(),
            rewritten,
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Reassignment {
    data: bool,
    user: bool,
}

/// Rewrite references to `from` in memory and report what changed.
fn reassign(journal: &mut Journal, from: i64, to: i64) -> Reassignment {
    let mut change = Reassignment::default();

    if let Some(data) = journal.data.as_mut() {
        for column in USER_REFERENCE_COLUMNS {
            if data.get(column).and_then(Value::as_i64) == Some(from) {
                change.data |= data.set(column, Value::from(to));
            }
        }
    }

    if journal.user_id == from && from != to {
        journal.user_id = to;
        change.user = true;
    }

    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::journal::FixedUser;
    use crate::journal::registry::JournalRegistry;
    use crate::model::journable::EntitySnapshot;
    use serde_json::json;

    fn work_package(id: i64, author: i64, assignee: Option<i64>) -> EntitySnapshot {
        EntitySnapshot::new("WorkPackage", id, "work_packages")
            .with_attribute("subject", format!("WP {id}"))
            .with_attribute("author_id", author)
            .with_attribute("assigned_to_id", assignee.map_or(Value::Null, Value::from))
    }

    #[test]
    fn rewrites_every_user_column_and_the_actor() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let journal = manager
            .add_journal(&work_package(1, 10, Some(10)), &FixedUser(10), "")
            .expect("journal");

        let stats = manager.update_user_references(10, 20).expect("migrate");
        assert_eq!(stats.rewritten, 1);

        let after = manager.reload(journal.id).expect("reload");
        let data = after.data.expect("snapshot");
        assert_eq!(data.get("author_id"), Some(&json!(20)));
        assert_eq!(data.get("assigned_to_id"), Some(&json!(20)));
        assert_eq!(after.user_id, 20);
    }

    #[test]
    fn other_users_are_left_alone() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let journal = manager
            .add_journal(&work_package(1, 11, None), &FixedUser(12), "")
            .expect("journal");

        let stats = manager.update_user_references(10, 20).expect("migrate");
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.rewritten, 0);

        let after = manager.reload(journal.id).expect("reload");
        assert_eq!(after.user_id, 12);
        assert_eq!(after.data.expect("snapshot").get("assigned_to_id"), Some(&Value::Null));
    }

    #[test]
    fn small_batches_visit_every_journal() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        for id in 1..=7 {
            manager
                .add_journal(&work_package(id, 10, None), &FixedUser(1), "")
                .expect("journal");
        }

        let stats = manager
            .update_user_references_in_batches(10, 20, 3)
            .expect("migrate");
        assert_eq!(
            stats,
            UserReassignmentStats {
                batches: 3,
                scanned: 7,
                rewritten: 7
            }
        );

        let again = manager
            .update_user_references_in_batches(10, 20, 3)
            .expect("second run");
        assert_eq!(again.rewritten, 0);
    }

    #[test]
    fn journals_added_between_batches_are_visited() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        for id in 1..=2 {
            manager
                .add_journal(&work_package(id, 10, None), &FixedUser(1), "")
                .expect("journal");
        }

        let first = manager
            .reassign_user_batch(10, 20, 0, 2)
            .expect("first batch")
            .expect("journals to scan");
        assert_eq!(first.scanned, 2);
        assert_eq!(first.rewritten, 2);

        let late = manager
            .add_journal(&work_package(3, 10, None), &FixedUser(10), "")
            .expect("late journal");

        let second = manager
            .reassign_user_batch(10, 20, first.cursor, 2)
            .expect("second batch")
            .expect("late journal is past the cursor");
        assert_eq!(second.scanned, 1);
        assert_eq!(second.rewritten, 1);
        assert_eq!(second.cursor, late.id);
        assert!(
            manager
                .reassign_user_batch(10, 20, second.cursor, 2)
                .expect("third batch")
                .is_none()
        );

        let after = manager.reload(late.id).expect("reload");
        assert_eq!(after.user_id, 20);
        assert_eq!(after.data.expect("snapshot").get("author_id"), Some(&json!(20)));
    }

    #[test]
    fn empty_store_finishes_without_batches() {
        let conn = open_in_memory().expect("open store");
        let registry = JournalRegistry::builtin();
        let manager = JournalManager::new(&conn, &registry);

        let stats = manager.update_user_references(10, 20).expect("migrate");
        assert_eq!(stats, UserReassignmentStats::default());
    }
}
