//! `chr log`: journal history of one entity with per-version change sets.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chronicle_core::JournalManager;
use chronicle_core::journal::changes::JournalChanges;
use clap::Args;
use std::io::Write;

use super::Session;
use crate::output::{OutputMode, pretty_rule, render, write_changes};

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Entity type (subtypes resolve to their base type).
    #[arg(value_name = "TYPE")]
    pub type_name: String,

    /// Entity id.
    pub id: i64,

    /// Show only the most recent N journals.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

/// Execute `chr log`.
pub fn run_log(args: &LogArgs, session: &Session) -> Result<()> {
    let conn = session.open_store()?;
    let manager = JournalManager::new(&conn, &session.registry);

    let mut entries = manager.history(&args.type_name, args.id)?;
    if let Some(limit) = args.limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    let mode = session.output;
    render(mode, &entries, |entries, w| {
        if entries.is_empty() {
            return writeln!(w, "no journals for {} #{}", args.type_name, args.id);
        }
        for entry in entries {
            write_entry(w, entry, mode)?;
        }
        Ok(())
    })
}

fn write_entry(w: &mut dyn Write, entry: &JournalChanges, mode: OutputMode) -> std::io::Result<()> {
    let journal = &entry.journal;
    writeln!(
        w,
        "v{}  {}  user {}  {}",
        journal.version,
        format_timestamp(journal.created_at_us),
        journal.user_id,
        journal.activity_type
    )?;
    if !journal.notes.is_empty() {
        writeln!(w, "  notes: {}", journal.notes)?;
    }
    write_changes(w, &entry.changes, "  ")?;
    if mode == OutputMode::Pretty {
        pretty_rule(w)?;
    }
    Ok(())
}

fn format_timestamp(us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(us)
        .map_or_else(|| us.to_string(), |ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
}
