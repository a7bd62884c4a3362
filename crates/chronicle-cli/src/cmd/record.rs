//! `chr record`: journal an entity state if it changed.

use anyhow::Result;
use chronicle_core::JournalManager;
use chronicle_core::journal::FixedUser;
use chronicle_core::journal::diff::ChangeSet;
use chronicle_core::model::journal::Journal;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use super::{Session, load_entity};
use crate::output::{pretty_kv, pretty_section, render, write_changes};

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Entity JSON file.
    pub entity: PathBuf,

    /// Notes stored with the journal.
    #[arg(long, default_value = "")]
    pub notes: String,
}

#[derive(Debug, Serialize)]
struct RecordOutput {
    recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    journal: Option<Journal>,
    changes: ChangeSet,
}

/// Execute `chr record`.
///
/// Detection and the write run in one transaction, so a concurrent writer
/// cannot slip a version in between.
pub fn run_record(args: &RecordArgs, session: &Session) -> Result<()> {
    let entity = load_entity(&args.entity)?;
    let mut conn = session.open_store()?;
    let tx = conn.transaction()?;

    let out = {
        let manager = JournalManager::new(&tx, &session.registry);
        let user = FixedUser(session.user_id);
        match manager.record_if_changed(&entity, &user, &args.notes)? {
            Some(journal) => {
                let changes = manager.journal_changes(&journal)?;
                RecordOutput {
                    recorded: true,
                    journal: Some(journal),
                    changes,
                }
            }
            None => RecordOutput {
                recorded: false,
                journal: None,
                changes: ChangeSet::new(),
            },
        }
    };
    tx.commit()?;

    render(session.output, &out, |o, w| match &o.journal {
        Some(journal) => {
            pretty_section(
                w,
                &format!(
                    "Recorded {} #{} version {}",
                    journal.journable_type, journal.journable_id, journal.version
                ),
            )?;
            pretty_kv(w, "journal", journal.id.to_string())?;
            pretty_kv(w, "user", journal.user_id.to_string())?;
            if !journal.notes.is_empty() {
                pretty_kv(w, "notes", &journal.notes)?;
            }
            write_changes(w, &o.changes, "  ")
        }
        None => writeln!(w, "unchanged: {} #{}", entity.type_name, entity.id),
    })
}
