//! `chr reassign-user`: move every journal reference from one user to another.

use anyhow::Result;
use chronicle_core::JournalManager;
use clap::Args;

use super::Session;
use crate::output::{pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct ReassignArgs {
    /// User id to replace.
    #[arg(long)]
    pub from: i64,

    /// Substitute user id.
    #[arg(long)]
    pub to: i64,

    /// Journals per batch. Defaults to `journal.user_batch_size`.
    #[arg(long)]
    pub batch_size: Option<usize>,
}

/// Execute `chr reassign-user`.
pub fn run_reassign(args: &ReassignArgs, session: &Session) -> Result<()> {
    let conn = session.open_store()?;
    let manager = JournalManager::new(&conn, &session.registry);

    let batch_size = args
        .batch_size
        .unwrap_or(session.project.journal.user_batch_size);
    let stats = manager.update_user_references_in_batches(args.from, args.to, batch_size)?;

    render(session.output, &stats, |s, w| {
        pretty_section(w, &format!("Reassigned user {} to {}", args.from, args.to))?;
        pretty_kv(w, "batches", s.batches.to_string())?;
        pretty_kv(w, "scanned", s.scanned.to_string())?;
        pretty_kv(w, "rewritten", s.rewritten.to_string())
    })
}
