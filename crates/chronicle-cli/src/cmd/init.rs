//! `chr init`: create the journal store and a default project config.

use anyhow::{Context as _, Result};
use chronicle_core::config::project_config_path;
use chronicle_core::db::migrations::current_schema_version;
use clap::Args;
use serde::Serialize;
use std::io::Write;

use super::Session;
use crate::output::{pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Re-run initialization even if the store already exists.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[journal]\n\
    user_batch_size = 1000\n\
    \n\
    # Declare extra journaled types:\n\
    # [[journal.types]]\n\
    # name = \"Meeting\"\n\
    # columns = [\"title\", \"author_id\", \"location\"]\n\
    # subtypes = [\"RecurringMeeting\"]\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    db: String,
    config: String,
    schema_version: u32,
    config_created: bool,
}

/// Execute `chr init`.
///
/// Creates `.chronicle/config.toml` when missing (never overwrites it) and
/// opens the store, which creates and migrates it.
pub fn run_init(args: &InitArgs, session: &Session) -> Result<()> {
    if session.db_path.exists() && !args.force {
        anyhow::bail!(
            "journal store already exists at {}. Use `chr init --force` to re-run migrations.",
            session.db_path.display()
        );
    }

    let config_path = project_config_path(&session.project_root);
    let config_created = !config_path.exists();
    if config_created {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let conn = chronicle_core::db::open_store(&session.db_path)?;
    let schema_version = current_schema_version(&conn)?;
    tracing::info!(db = %session.db_path.display(), schema_version, "initialized journal store");

    let out = InitOutput {
        db: session.db_path.display().to_string(),
        config: config_path.display().to_string(),
        schema_version,
        config_created,
    };
    render(session.output, &out, |o, w| {
        writeln!(w, "Initialized journal store")?;
        pretty_kv(w, "store", &o.db)?;
        pretty_kv(w, "config", &o.config)?;
        pretty_kv(w, "schema", o.schema_version.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputMode;
    use chronicle_core::config::{ProjectConfig, load_project_config};

    #[test]
    fn default_config_template_parses() {
        let config: ProjectConfig = toml::from_str(CONFIG_TOML).expect("template parses");
        assert_eq!(config.journal.user_batch_size, 1000);
        assert!(config.journal.types.is_empty());
    }

    #[test]
    fn init_creates_store_and_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = Session::new(
            dir.path().to_path_buf(),
            None,
            OutputMode::Json,
            0,
            ProjectConfig::default(),
        );

        run_init(&InitArgs { force: false }, &session).expect("init");
        assert!(session.db_path.exists());
        load_project_config(dir.path()).expect("config readable");

        assert!(run_init(&InitArgs { force: false }, &session).is_err());
        run_init(&InitArgs { force: true }, &session).expect("forced init");
    }
}
