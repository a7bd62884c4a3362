//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly. The mode itself is resolved by
//! [`chronicle_core::config::resolve_config`]: `--json`, then `FORMAT`, then
//! the user config, then TTY detection.

use chronicle_core::error::{ErrorCode, JournalError};
use chronicle_core::journal::diff::ChangeSet;
use serde::Serialize;
use std::io::{self, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized output with sections and separators.
    Pretty,
    /// Plain text, one record per line, for pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Map a resolved mode name (`pretty`, `text`, `json`) to a mode.
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }
}

/// Structured error for CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E2001").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// Create a simple error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    /// Create an error carrying the code and hint of `code`.
    pub fn with_code(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }

    /// Build from an arbitrary error chain, picking up a [`JournalError`]
    /// code when one is present.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        if let Some(coded) = err.downcast_ref::<CodedError>() {
            return Self::with_code(message, coded.code);
        }
        match err.downcast_ref::<JournalError>() {
            Some(journal_err) => Self::with_code(message, journal_err.code()),
            None => Self::new(message),
        }
    }
}

/// An error raised by the CLI itself that maps to an [`ErrorCode`].
#[derive(Debug)]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CodedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CodedError {}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode, serializes `value` as pretty-printed JSON. Otherwise,
/// calls `human_fn` to produce text.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            human_fn(value, &mut out)?;
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Write a change set as `key: old -> new` lines.
pub fn write_changes(w: &mut dyn Write, changes: &ChangeSet, indent: &str) -> io::Result<()> {
    if changes.is_empty() {
        return writeln!(w, "{indent}(no changes)");
    }
    for (key, change) in changes {
        writeln!(
            w,
            "{indent}{key}: {} -> {}",
            change.old_value(),
            change.new_value()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::journal::diff::Change;
    use serde_json::{Value, json};

    #[test]
    fn resolved_names_map_to_modes() {
        assert_eq!(OutputMode::from_resolved("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_resolved("text"), OutputMode::Text);
        assert_eq!(OutputMode::from_resolved("pretty"), OutputMode::Pretty);
    }

    #[test]
    fn journal_errors_carry_their_code() {
        let err = anyhow::Error::new(JournalError::UnknownJournableType("Sprint".into()));
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E1003"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn coded_errors_survive_context() {
        let err = anyhow::Error::new(CodedError::new(ErrorCode::NotInitialized, "no store"))
            .context("open store");
        let cli = CliError::from_anyhow(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E1001"));
        assert!(cli.message.contains("no store"));
    }

    #[test]
    fn plain_errors_have_no_code() {
        let cli = CliError::from_anyhow(&anyhow::anyhow!("boom"));
        assert!(cli.error_code.is_none());
        assert!(cli.suggestion.is_none());
    }

    #[test]
    fn changes_render_one_per_line() {
        let mut changes = ChangeSet::new();
        changes.insert("subject".into(), Change(json!("a"), json!("b")));
        changes.insert("attachable_5".into(), Change(json!("a.png"), Value::Null));

        let mut buf = Vec::new();
        write_changes(&mut buf, &changes, "  ").expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "  attachable_5: \"a.png\" -> null\n  subject: \"a\" -> \"b\"\n");
    }

    #[test]
    fn empty_change_set_says_so() {
        let mut buf = Vec::new();
        write_changes(&mut buf, &ChangeSet::new(), "").expect("write");
        assert_eq!(String::from_utf8(buf).expect("utf8"), "(no changes)\n");
    }
}
