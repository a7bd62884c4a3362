//! SQLite journal store utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers are not blocked while a save appends
//! - `busy_timeout = 5s` to absorb short lock waits from concurrent writers
//! - `foreign_keys = ON` so dependents cascade with their journal

pub mod migrations;
pub mod schema;
pub mod store;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

use crate::error::JournalError;

/// Busy timeout used for journal store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const WRITE_SAVEPOINT: &str = "chronicle_write";

/// Open (or create) the journal store, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create journal store directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open journal store {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply journal store migrations")?;

    Ok(conn)
}

/// Open a migrated in-memory store.
///
/// # Errors
///
/// Returns an error if the schema cannot be created.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory journal store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply journal store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Run `f` as one all-or-nothing write unit.
///
/// Uses a savepoint, so it nests inside a transaction the caller already
/// holds (the entity's own save) and acts as its own transaction otherwise.
/// On error every write made by `f` is rolled back.
pub(crate) fn atomically<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, JournalError>,
) -> Result<T, JournalError> {
    conn.execute_batch(&format!("SAVEPOINT {WRITE_SAVEPOINT}"))?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {WRITE_SAVEPOINT}"))?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = conn.execute_batch(&format!(
                "ROLLBACK TO {WRITE_SAVEPOINT}; RELEASE {WRITE_SAVEPOINT}"
            )) {
                tracing::warn!(error = %rollback, "failed to roll back journal write");
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, atomically, open_in_memory, open_store};
    use crate::db::migrations;
    use crate::error::JournalError;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".chronicle/journals.db");
        (dir, path)
    }

    #[test]
    fn open_store_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open journal store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_store_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path).expect("open journal store");

        let version = migrations::current_schema_version(&conn).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    fn journal_count(conn: &rusqlite::Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM journals", [], |row| row.get(0))
            .expect("count journals")
    }

    #[test]
    fn atomically_rolls_back_every_write_on_error() {
        let conn = open_in_memory().expect("open store");

        let result: Result<(), JournalError> = atomically(&conn, |conn| {
            conn.execute(
                "INSERT INTO journals (journable_id, journable_type, version, user_id, created_at_us)
                 VALUES (1, 'WorkPackage', 1, 1, 0)",
                [],
            )?;
            Err(JournalError::JournalNotFound("forced".into()))
        });

        assert!(result.is_err());
        assert_eq!(journal_count(&conn), 0);
    }

    #[test]
    fn atomically_nests_inside_an_outer_transaction() {
        let mut conn = open_in_memory().expect("open store");
        let tx = conn.transaction().expect("begin outer transaction");

        atomically(&tx, |conn| {
            conn.execute(
                "INSERT INTO journals (journable_id, journable_type, version, user_id, created_at_us)
                 VALUES (1, 'WorkPackage', 1, 1, 0)",
                [],
            )?;
            Ok(())
        })
        .expect("nested write");

        tx.rollback().expect("roll back outer transaction");
        assert_eq!(journal_count(&conn), 0);
    }
}
