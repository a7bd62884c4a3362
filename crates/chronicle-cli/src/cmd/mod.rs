//! Command handlers for `chr`.
//!
//! Each handler takes its clap args and the [`Session`] resolved once in
//! `main`, and renders through [`crate::output`].

pub mod changed;
pub mod init;
pub mod log;
pub mod reassign;
pub mod rebuild;
pub mod record;

use anyhow::{Context as _, Result};
use chronicle_core::config::ProjectConfig;
use chronicle_core::error::ErrorCode;
use chronicle_core::journal::registry::JournalRegistry;
use chronicle_core::model::journable::EntitySnapshot;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::output::{CodedError, OutputMode};

/// Store location relative to the project root when `--db` is not given.
pub const DEFAULT_DB_PATH: &str = ".chronicle/journals.db";

/// Everything a command needs that was resolved from flags, environment
/// and config files.
#[derive(Debug)]
pub struct Session {
    pub project_root: PathBuf,
    pub db_path: PathBuf,
    pub output: OutputMode,
    pub user_id: i64,
    pub project: ProjectConfig,
    pub registry: JournalRegistry,
}

impl Session {
    pub fn new(
        project_root: PathBuf,
        db_flag: Option<PathBuf>,
        output: OutputMode,
        user_id: i64,
        project: ProjectConfig,
    ) -> Self {
        let db_path = db_flag.unwrap_or_else(|| project_root.join(DEFAULT_DB_PATH));
        let registry = JournalRegistry::from_config(&project.journal);
        Self {
            project_root,
            db_path,
            output,
            user_id,
            project,
            registry,
        }
    }

    /// Open the existing store. A missing store is reported as not
    /// initialized rather than silently created.
    pub fn open_store(&self) -> Result<Connection> {
        if !self.db_path.exists() {
            return Err(CodedError::new(
                ErrorCode::NotInitialized,
                format!("no journal store at {}", self.db_path.display()),
            )
            .into());
        }
        chronicle_core::db::open_store(&self.db_path)
    }
}

/// Read an entity snapshot from a JSON file.
pub fn load_entity(path: &Path) -> Result<EntitySnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str::<EntitySnapshot>(&content).map_err(|e| {
        CodedError::new(
            ErrorCode::InvalidEntity,
            format!("{} is not a valid entity: {e}", path.display()),
        )
        .into()
    })
}
