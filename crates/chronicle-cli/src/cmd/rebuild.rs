//! `chr recreate-initial`: rebuild version 1 of an entity from its live state.

use anyhow::Result;
use chronicle_core::JournalManager;
use clap::Args;
use std::path::PathBuf;

use super::{Session, load_entity};
use crate::output::{pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct RecreateInitialArgs {
    /// Entity JSON file with the state to rebuild from.
    pub entity: PathBuf,
}

/// Execute `chr recreate-initial`.
pub fn run_recreate_initial(args: &RecreateInitialArgs, session: &Session) -> Result<()> {
    let entity = load_entity(&args.entity)?;
    let conn = session.open_store()?;
    let manager = JournalManager::new(&conn, &session.registry);

    let journal = manager.rebuild_initial_journal(&entity)?;

    render(session.output, &journal, |j, w| {
        pretty_section(
            w,
            &format!("Rebuilt {} #{} version {}", j.journable_type, j.journable_id, j.version),
        )?;
        pretty_kv(w, "journal", j.id.to_string())?;
        pretty_kv(
            w,
            "columns",
            j.data
                .as_ref()
                .map_or(0, |d| d.journaled_attributes().len())
                .to_string(),
        )?;
        pretty_kv(w, "attachments", j.attachable_journals.len().to_string())?;
        pretty_kv(w, "custom", j.customizable_journals.len().to_string())
    })
}
