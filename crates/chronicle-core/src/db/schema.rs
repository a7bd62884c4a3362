//! Canonical SQLite schema for the journal store.
//!
//! - `journals` holds one row per recorded version of a journable entity;
//!   `(journable_id, journable_type, version)` is unique so two writers can
//!   never both claim the same next version
//! - `journal_data` is the snapshot record (filtered column values as JSON)
//! - `attachable_journals` / `customizable_journals` record the attachment
//!   set and non-blank custom-value set present at each version
//! - `store_meta` tracks the schema version

/// Migration v1: journals, snapshot records, association rows, metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS journals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    journable_id INTEGER NOT NULL,
    journable_type TEXT NOT NULL CHECK (length(trim(journable_type)) > 0),
    version INTEGER NOT NULL CHECK (version > 0),
    user_id INTEGER NOT NULL,
    notes TEXT NOT NULL DEFAULT '',
    activity_type TEXT NOT NULL DEFAULT '',
    created_at_us INTEGER NOT NULL,
    UNIQUE (journable_id, journable_type, version)
);

CREATE TABLE IF NOT EXISTS journal_data (
    journal_id INTEGER PRIMARY KEY REFERENCES journals(id) ON DELETE CASCADE,
    data_type TEXT NOT NULL,
    data_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attachable_journals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    journal_id INTEGER NOT NULL REFERENCES journals(id) ON DELETE CASCADE,
    attachment_id INTEGER NOT NULL,
    filename TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS customizable_journals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    journal_id INTEGER NOT NULL REFERENCES journals(id) ON DELETE CASCADE,
    custom_field_id INTEGER NOT NULL,
    value TEXT
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for history, activity and user lookups.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_journals_journable
    ON journals(journable_type, journable_id, version);

CREATE INDEX IF NOT EXISTS idx_journals_user
    ON journals(user_id);

CREATE INDEX IF NOT EXISTS idx_journals_activity_created
    ON journals(activity_type, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_attachable_journals_journal
    ON attachable_journals(journal_id, attachment_id);

CREATE INDEX IF NOT EXISTS idx_customizable_journals_journal
    ON customizable_journals(journal_id, custom_field_id);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by history and maintenance query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_journals_journable",
    "idx_journals_user",
    "idx_journals_activity_created",
    "idx_attachable_journals_journal",
    "idx_customizable_journals_journal",
];
