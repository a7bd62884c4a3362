#![forbid(unsafe_code)]

mod cmd;
mod output;

use anyhow::Context as _;
use chronicle_core::config::resolve_config;
use chronicle_core::error::ErrorCode;
use clap::{Parser, Subcommand};
use output::{CliError, CodedError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chr: journal store maintenance",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Journal store path (default: .chronicle/journals.db).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Acting user id (overrides CHRONICLE_USER_ID and user config).
    #[arg(long, global = true, value_name = "ID")]
    user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Store",
        about = "Initialize the journal store",
        long_about = "Create .chronicle/config.toml and the journal store, applying migrations.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    chr init\n\n    # Re-run migrations on an existing store\n    chr init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Journals",
        about = "Journal an entity if it changed",
        long_about = "Compare an entity state with its last journal and record a new version if anything journaled differs.",
        after_help = "EXAMPLES:\n    # Record a work package save\n    chr record wp-42.json --notes \"Raised priority\"\n\n    # Act as a specific user\n    chr --user 7 record wp-42.json --json"
    )]
    Record(cmd::record::RecordArgs),

    #[command(
        next_help_heading = "Journals",
        about = "Show pending changes for an entity",
        long_about = "Diff an entity state against its last journal without writing anything.",
        after_help = "EXAMPLES:\n    chr changed wp-42.json"
    )]
    Changed(cmd::changed::ChangedArgs),

    #[command(
        next_help_heading = "Journals",
        about = "Show the journal history of an entity",
        after_help = "EXAMPLES:\n    # Full history\n    chr log WorkPackage 42\n\n    # Last three versions as JSON\n    chr log WorkPackage 42 -n 3 --json"
    )]
    Log(cmd::log::LogArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Rebuild the initial journal of an entity",
        long_about = "Overwrite version 1 of an entity with its current state, replacing attachment and custom value rows.",
        after_help = "EXAMPLES:\n    chr recreate-initial wp-42.json"
    )]
    RecreateInitial(cmd::rebuild::RecreateInitialArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Reassign journal references from one user to another",
        long_about = "Rewrite author, assignee and acting-user references in every journal, in committed batches.",
        after_help = "EXAMPLES:\n    # Hand a deleted account's history to the placeholder user\n    chr reassign-user --from 10 --to 2"
    )]
    ReassignUser(cmd::reassign::ReassignArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHRONICLE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "chr=debug,chronicle_core=debug,warn"
        } else {
            "chr=info,warn"
        })
    });

    let format = env::var("CHRONICLE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn build_session(cli: &Cli) -> anyhow::Result<cmd::Session> {
    let project_root = env::current_dir().context("resolve working directory")?;
    let config = resolve_config(&project_root, cli.json, cli.user)
        .map_err(|e| CodedError::new(ErrorCode::ConfigParseError, format!("{e:#}")))?;

    Ok(cmd::Session::new(
        project_root,
        cli.db.clone(),
        OutputMode::from_resolved(&config.resolved_output),
        config.resolved_user_id,
        config.project,
    ))
}

fn run(cli: &Cli, session: &cmd::Session) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, session),
        Commands::Record(args) => cmd::record::run_record(args, session),
        Commands::Changed(args) => cmd::changed::run_changed(args, session),
        Commands::Log(args) => cmd::log::run_log(args, session),
        Commands::RecreateInitial(args) => cmd::rebuild::run_recreate_initial(args, session),
        Commands::ReassignUser(args) => cmd::reassign::run_reassign(args, session),
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let session = match build_session(&cli) {
        Ok(session) => session,
        Err(e) => {
            let mode = if cli.json {
                OutputMode::Json
            } else {
                OutputMode::Text
            };
            report(mode, &e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &session) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(session.output, &e);
            ExitCode::FAILURE
        }
    }
}

fn report(mode: OutputMode, err: &anyhow::Error) {
    tracing::debug!(error = %format!("{err:#}"), "command failed");
    if render_error(mode, &CliError::from_anyhow(err)).is_err() {
        eprintln!("error: {err:#}");
    }
}
