//! `chr changed`: show what a journal recorded now would contain.

use anyhow::Result;
use chronicle_core::JournalManager;
use chronicle_core::journal::diff::ChangeSet;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use super::{Session, load_entity};
use crate::output::{render, write_changes};

#[derive(Args, Debug)]
pub struct ChangedArgs {
    /// Entity JSON file.
    pub entity: PathBuf,
}

#[derive(Debug, Serialize)]
struct ChangedOutput {
    changed: bool,
    changes: ChangeSet,
}

/// Execute `chr changed`. Read-only.
pub fn run_changed(args: &ChangedArgs, session: &Session) -> Result<()> {
    let entity = load_entity(&args.entity)?;
    let conn = session.open_store()?;
    let manager = JournalManager::new(&conn, &session.registry);

    let out = ChangedOutput {
        changed: manager.changed(&entity)?,
        changes: manager.entity_changes(&entity)?,
    };

    render(session.output, &out, |o, w| {
        if o.changed {
            writeln!(w, "changed: {} #{}", entity.type_name, entity.id)?;
            write_changes(w, &o.changes, "  ")
        } else {
            writeln!(w, "unchanged: {} #{}", entity.type_name, entity.id)
        }
    })
}
