use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Default number of journals rewritten per batch when reassigning a user.
pub const DEFAULT_USER_BATCH_SIZE: usize = 1000;

/// Acting user when nothing else identifies one.
pub const ANONYMOUS_USER_ID: i64 = 0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default = "default_user_batch_size")]
    pub user_batch_size: usize,
    #[serde(default)]
    pub types: Vec<JournalTypeConfig>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            user_batch_size: default_user_batch_size(),
            types: Vec::new(),
        }
    }
}

/// A journaled type declared in `[[journal.types]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalTypeConfig {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub subtypes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
    pub resolved_user_id: i64,
}

/// Path of the project config file under `project_root`.
#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".chronicle/config.toml")
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("chronicle/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve project, user, output mode and acting user in one pass.
///
/// `cli_user` is the `--user` flag; `CHRONICLE_USER_ID` and `FORMAT` are
/// read from the environment.
pub fn resolve_config(
    project_root: &Path,
    cli_json: bool,
    cli_user: Option<i64>,
) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = std::env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format)?;
    let env_user = std::env::var("CHRONICLE_USER_ID").ok();
    let resolved_user_id = resolve_user_id(cli_user, env_user.as_deref(), user.user_id)?;

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
        resolved_user_id,
    })
}

/// Acting user precedence: flag, then `CHRONICLE_USER_ID`, then user
/// config, then anonymous.
pub fn resolve_user_id(
    cli_user: Option<i64>,
    env_user: Option<&str>,
    config_user: Option<i64>,
) -> Result<i64> {
    if let Some(id) = cli_user {
        return Ok(id);
    }

    if let Some(raw) = env_user.map(str::trim).filter(|raw| !raw.is_empty()) {
        return raw
            .parse::<i64>()
            .with_context(|| format!("CHRONICLE_USER_ID is not a user id: '{raw}'"));
    }

    Ok(config_user.unwrap_or(ANONYMOUS_USER_ID))
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
) -> Result<String> {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return Ok("json".to_string());
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return Ok(mode.to_string());
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return Ok(mode.to_string());
    }

    if std::io::stdout().is_terminal() {
        Ok("pretty".to_string())
    } else {
        Ok("text".to_string())
    }
}

const fn default_user_batch_size() -> usize {
    DEFAULT_USER_BATCH_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(root: &Path, content: &str) {
        let path = project_config_path(root);
        std::fs::create_dir_all(path.parent().expect("config has a parent"))
            .expect("create .chronicle");
        std::fs::write(&path, content).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load_project_config(dir.path()).expect("defaults");
        assert_eq!(config.journal.user_batch_size, DEFAULT_USER_BATCH_SIZE);
        assert!(config.journal.types.is_empty());
    }

    #[test]
    fn project_config_declares_types() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_config(
            dir.path(),
            r#"
[journal]
user_batch_size = 250

[[journal.types]]
name = "Meeting"
columns = ["title", "author_id"]
subtypes = ["RecurringMeeting"]
"#,
        );

        let config = load_project_config(dir.path()).expect("parse config");
        assert_eq!(config.journal.user_batch_size, 250);
        assert_eq!(
            config.journal.types,
            vec![JournalTypeConfig {
                name: "Meeting".into(),
                columns: vec!["title".into(), "author_id".into()],
                subtypes: vec!["RecurringMeeting".into()],
            }]
        );
    }

    #[test]
    fn invalid_project_config_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        write_config(dir.path(), "[journal\nuser_batch_size = ");

        let err = load_project_config(dir.path()).expect_err("invalid toml");
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn user_id_precedence() {
        assert_eq!(resolve_user_id(Some(3), Some("4"), Some(5)).expect("flag"), 3);
        assert_eq!(resolve_user_id(None, Some(" 4 "), Some(5)).expect("env"), 4);
        assert_eq!(resolve_user_id(None, Some(""), Some(5)).expect("config"), 5);
        assert_eq!(
            resolve_user_id(None, None, None).expect("anonymous"),
            ANONYMOUS_USER_ID
        );
        assert!(resolve_user_id(None, Some("admin"), None).is_err());
    }

    #[test]
    fn output_flag_and_env_win_over_user_config() {
        assert_eq!(
            resolve_output(true, Some("text".into()), None).expect("json flag"),
            "json"
        );
        assert_eq!(
            resolve_output(false, Some("text".into()), Some("human".into())).expect("env"),
            "pretty"
        );
        assert_eq!(
            resolve_output(false, Some("TEXT".into()), Some("bogus".into())).expect("user"),
            "text"
        );
    }
}
