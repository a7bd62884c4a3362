//! Typed reads and writes against the journal store.
//!
//! All functions take a shared `&Connection` (a `Transaction` derefs to
//! one) and return typed structs, never raw rows. Multi-row writes are left
//! to the caller to wrap in [`super::atomically`].

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use crate::error::JournalError;
use crate::model::journal::{
    AttachableJournal, CustomizableJournal, Journal, JournalData, NewJournal,
};

type Result<T> = std::result::Result<T, JournalError>;

const JOURNAL_COLUMNS: &str = "id, journable_id, journable_type, version, user_id, notes, \
                               activity_type, created_at_us";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Number of journals recorded for one entity.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_journals(conn: &Connection, journable_type: &str, journable_id: i64) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM journals WHERE journable_type = ?1 AND journable_id = ?2",
        params![journable_type, journable_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// All journals of one entity, ordered by version.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_journals(
    conn: &Connection,
    journable_type: &str,
    journable_id: i64,
) -> Result<Vec<Journal>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOURNAL_COLUMNS} FROM journals
         WHERE journable_type = ?1 AND journable_id = ?2
         ORDER BY version ASC"
    ))?;
    let heads = stmt
        .query_map(params![journable_type, journable_id], journal_head)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    heads
        .into_iter()
        .map(|head| load_dependents(conn, head))
        .collect()
}

/// The most recent journal of one entity, the predecessor of its next change.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn latest_journal(
    conn: &Connection,
    journable_type: &str,
    journable_id: i64,
) -> Result<Option<Journal>> {
    let head = conn
        .query_row(
            &format!(
                "SELECT {JOURNAL_COLUMNS} FROM journals
                 WHERE journable_type = ?1 AND journable_id = ?2
                 ORDER BY version DESC LIMIT 1"
            ),
            params![journable_type, journable_id],
            journal_head,
        )
        .optional()?;

    head.map(|head| load_dependents(conn, head)).transpose()
}

/// One journal of an entity by version number.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_version(
    conn: &Connection,
    journable_type: &str,
    journable_id: i64,
    version: u32,
) -> Result<Option<Journal>> {
    let head = conn
        .query_row(
            &format!(
                "SELECT {JOURNAL_COLUMNS} FROM journals
                 WHERE journable_type = ?1 AND journable_id = ?2 AND version = ?3"
            ),
            params![journable_type, journable_id, version],
            journal_head,
        )
        .optional()?;

    head.map(|head| load_dependents(conn, head)).transpose()
}

/// One journal by its row id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_journal(conn: &Connection, journal_id: i64) -> Result<Option<Journal>> {
    let head = conn
        .query_row(
            &format!("SELECT {JOURNAL_COLUMNS} FROM journals WHERE id = ?1"),
            params![journal_id],
            journal_head,
        )
        .optional()?;

    head.map(|head| load_dependents(conn, head)).transpose()
}

/// Up to `limit` journals with an id greater than `after_id`, in ascending
/// id order. Association rows are not loaded.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn journals_after(conn: &Connection, after_id: i64, limit: usize) -> Result<Vec<Journal>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare(&format!(
        "SELECT {JOURNAL_COLUMNS} FROM journals
         WHERE id > ?1
         ORDER BY id ASC
         LIMIT ?2"
    ))?;
    let heads = stmt
        .query_map(params![after_id, limit], journal_head)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    heads
        .into_iter()
        .map(|mut journal| {
            journal.data = load_data(conn, journal.id)?;
            Ok(journal)
        })
        .collect()
}

fn journal_head(row: &Row<'_>) -> rusqlite::Result<Journal> {
    Ok(Journal {
        id: row.get(0)?,
        journable_id: row.get(1)?,
        journable_type: row.get(2)?,
        version: row.get(3)?,
        user_id: row.get(4)?,
        notes: row.get(5)?,
        activity_type: row.get(6)?,
        created_at_us: row.get(7)?,
        data: None,
        attachable_journals: Vec::new(),
        customizable_journals: Vec::new(),
    })
}

fn load_dependents(conn: &Connection, mut journal: Journal) -> Result<Journal> {
    journal.data = load_data(conn, journal.id)?;
    journal.attachable_journals = load_attachable(conn, journal.id)?;
    journal.customizable_journals = load_customizable(conn, journal.id)?;
    Ok(journal)
}

/// Load the snapshot record of a journal.
///
/// An unreadable snapshot is logged and reported as absent; callers treat a
/// journal without data like a missing predecessor.
fn load_data(conn: &Connection, journal_id: i64) -> Result<Option<JournalData>> {
    let raw: Option<(String, String)> = conn
        .query_row(
            "SELECT data_type, data_json FROM journal_data WHERE journal_id = ?1",
            params![journal_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((data_type, json)) = raw else {
        return Ok(None);
    };

    match JournalData::from_json(journal_id, data_type, &json) {
        Ok(data) => Ok(Some(data)),
        Err(e) => {
            tracing::warn!(journal_id, error = %e, "ignoring unreadable journal snapshot");
            Ok(None)
        }
    }
}

fn load_attachable(conn: &Connection, journal_id: i64) -> Result<Vec<AttachableJournal>> {
    let mut stmt = conn.prepare(
        "SELECT attachment_id, filename FROM attachable_journals
         WHERE journal_id = ?1
         ORDER BY attachment_id, id",
    )?;
    let rows = stmt
        .query_map(params![journal_id], |row| {
            Ok(AttachableJournal {
                attachment_id: row.get(0)?,
                filename: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn load_customizable(conn: &Connection, journal_id: i64) -> Result<Vec<CustomizableJournal>> {
    let mut stmt = conn.prepare(
        "SELECT custom_field_id, value FROM customizable_journals
         WHERE journal_id = ?1
         ORDER BY custom_field_id, id",
    )?;
    let rows = stmt
        .query_map(params![journal_id], |row| {
            Ok(CustomizableJournal {
                custom_field_id: row.get(0)?,
                value: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a built journal with its snapshot record and association rows.
/// Returns the new journal id.
///
/// # Errors
///
/// Returns [`JournalError::VersionCollision`] if the entity already has a
/// journal at `journal.version`, or a storage error for any other failure.
pub fn insert_journal(conn: &Connection, journal: &NewJournal, created_at_us: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO journals (
            journable_id, journable_type, version, user_id, notes, activity_type, created_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            journal.journable_id,
            journal.journable_type,
            journal.version,
            journal.user_id,
            journal.notes,
            journal.activity_type,
            created_at_us,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            JournalError::VersionCollision {
                journable_type: journal.journable_type.clone(),
                journable_id: journal.journable_id,
                version: journal.version,
            }
        } else {
            JournalError::Storage(e)
        }
    })?;

    let journal_id = conn.last_insert_rowid();
    upsert_data(conn, journal_id, &journal.data)?;
    insert_association_rows(
        conn,
        journal_id,
        &journal.attachable_journals,
        &journal.customizable_journals,
    )?;

    Ok(journal_id)
}

/// Write (or overwrite) the snapshot record of a journal.
///
/// # Errors
///
/// Returns an error if encoding or the write fails.
pub fn upsert_data(conn: &Connection, journal_id: i64, data: &JournalData) -> Result<()> {
    conn.execute(
        "INSERT INTO journal_data (journal_id, data_type, data_json) VALUES (?1, ?2, ?3)
         ON CONFLICT(journal_id) DO UPDATE SET
            data_type = excluded.data_type,
            data_json = excluded.data_json",
        params![journal_id, data.data_type, data.to_json()?],
    )?;
    Ok(())
}

/// Append association rows to a journal.
///
/// # Errors
///
/// Returns an error if any insert fails.
pub fn insert_association_rows(
    conn: &Connection,
    journal_id: i64,
    attachable: &[AttachableJournal],
    customizable: &[CustomizableJournal],
) -> Result<()> {
    let mut attach = conn.prepare_cached(
        "INSERT INTO attachable_journals (journal_id, attachment_id, filename)
         VALUES (?1, ?2, ?3)",
    )?;
    for row in attachable {
        attach.execute(params![journal_id, row.attachment_id, row.filename])?;
    }

    let mut custom = conn.prepare_cached(
        "INSERT INTO customizable_journals (journal_id, custom_field_id, value)
         VALUES (?1, ?2, ?3)",
    )?;
    for row in customizable {
        custom.execute(params![journal_id, row.custom_field_id, row.value])?;
    }

    Ok(())
}

/// Remove every association row of a journal. Returns the number removed.
///
/// # Errors
///
/// Returns an error if a delete fails.
pub fn delete_association_rows(conn: &Connection, journal_id: i64) -> Result<usize> {
    let attachable = conn.execute(
        "DELETE FROM attachable_journals WHERE journal_id = ?1",
        params![journal_id],
    )?;
    let customizable = conn.execute(
        "DELETE FROM customizable_journals WHERE journal_id = ?1",
        params![journal_id],
    )?;
    Ok(attachable + customizable)
}

/// Change the acting user recorded on a journal.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn update_journal_user(conn: &Connection, journal_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE journals SET user_id = ?1 WHERE id = ?2",
        params![user_id, journal_id],
    )?;
    Ok(())
}

/// Delete every journal of one entity; dependents cascade. Used when the
/// entity itself is destroyed. Returns the number of journals removed.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn delete_journals_for(
    conn: &Connection,
    journable_type: &str,
    journable_id: i64,
) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM journals WHERE journable_type = ?1 AND journable_id = ?2",
        params![journable_type, journable_id],
    )?)
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::model::journable::Attributes;
    use serde_json::json;

    fn new_journal(id: i64, version: u32) -> NewJournal {
        let mut attributes = Attributes::new();
        attributes.insert("subject".into(), json!(format!("v{version}")));
        attributes.insert("author_id".into(), json!(10));
        NewJournal {
            journable_id: id,
            journable_type: "WorkPackage".into(),
            version,
            user_id: 10,
            notes: String::new(),
            activity_type: "work_packages".into(),
            data: JournalData::new("WorkPackageJournal".into(), attributes),
            attachable_journals: vec![AttachableJournal {
                attachment_id: 5,
                filename: "a.png".into(),
            }],
            customizable_journals: vec![CustomizableJournal {
                custom_field_id: 1,
                value: Some("MySQL".into()),
            }],
        }
    }

    #[test]
    fn insert_and_load_round_trip_with_dependents() {
        let conn = open_in_memory().expect("open store");
        let id = insert_journal(&conn, &new_journal(1, 1), 100).expect("insert");

        let loaded = find_journal(&conn, id).expect("query").expect("journal exists");
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.created_at_us, 100);
        let data = loaded.data.expect("snapshot present");
        assert_eq!(data.get("subject"), Some(&json!("v1")));
        assert_eq!(loaded.attachable_journals.len(), 1);
        assert_eq!(loaded.customizable_journals[0].value.as_deref(), Some("MySQL"));
    }

    #[test]
    fn colliding_version_maps_to_version_collision() {
        let conn = open_in_memory().expect("open store");
        insert_journal(&conn, &new_journal(1, 1), 0).expect("first insert");

        let err = insert_journal(&conn, &new_journal(1, 1), 0).expect_err("collision");
        assert!(matches!(
            err,
            JournalError::VersionCollision { version: 1, journable_id: 1, .. }
        ));
    }

    #[test]
    fn latest_and_by_version_follow_version_order() {
        let conn = open_in_memory().expect("open store");
        for version in 1..=3 {
            insert_journal(&conn, &new_journal(9, version), 0).expect("insert");
        }

        assert_eq!(count_journals(&conn, "WorkPackage", 9).expect("count"), 3);
        let latest = latest_journal(&conn, "WorkPackage", 9)
            .expect("query")
            .expect("latest exists");
        assert_eq!(latest.version, 3);
        let second = find_by_version(&conn, "WorkPackage", 9, 2)
            .expect("query")
            .expect("v2 exists");
        assert_eq!(second.data.expect("data").get("subject"), Some(&json!("v2")));
        assert!(latest_journal(&conn, "WorkPackage", 10).expect("query").is_none());
    }

    #[test]
    fn unreadable_snapshot_loads_as_absent() {
        let conn = open_in_memory().expect("open store");
        let id = insert_journal(&conn, &new_journal(1, 1), 0).expect("insert");
        conn.execute(
            "UPDATE journal_data SET data_json = 'not json' WHERE journal_id = ?1",
            params![id],
        )
        .expect("corrupt snapshot");

        let loaded = find_journal(&conn, id).expect("query").expect("journal exists");
        assert!(loaded.data.is_none());
    }

    #[test]
    fn deleting_journals_cascades_to_dependents() {
        let conn = open_in_memory().expect("open store");
        insert_journal(&conn, &new_journal(1, 1), 0).expect("insert");
        insert_journal(&conn, &new_journal(1, 2), 0).expect("insert");

        assert_eq!(delete_journals_for(&conn, "WorkPackage", 1).expect("delete"), 2);
        let orphans: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM journal_data)
                      + (SELECT COUNT(*) FROM attachable_journals)
                      + (SELECT COUNT(*) FROM customizable_journals)",
                [],
                |row| row.get(0),
            )
            .expect("count dependents");
        assert_eq!(orphans, 0);
    }

    #[test]
    fn journals_after_pages_in_id_order() {
        let conn = open_in_memory().expect("open store");
        for id in 1..=5 {
            insert_journal(&conn, &new_journal(id, 1), 0).expect("insert");
        }

        let first = journals_after(&conn, 0, 2).expect("page 1");
        assert_eq!(first.iter().map(|j| j.journable_id).collect::<Vec<_>>(), [1, 2]);
        assert!(first.iter().all(|j| j.data.is_some()));
        let cursor = first.last().expect("non-empty").id;
        let rest = journals_after(&conn, cursor, 10).expect("page 2");
        assert_eq!(rest.len(), 3);
        assert!(journals_after(&conn, rest[2].id, 10).expect("page 3").is_empty());
    }
}
