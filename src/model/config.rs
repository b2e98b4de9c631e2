use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name looked up next to the board file
pub const CONFIG_FILE_NAME: &str = "mdboard.toml";

/// Engine settings from `mdboard.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prefix for display ids (`ACME` turns `TASK-007` into `ACME-007`)
    #[serde(default)]
    pub project_prefix: Option<String>,
    /// Columns that close a task when it is moved into them
    #[serde(default = "default_terminal_columns")]
    pub terminal_columns: Vec<String>,
    /// How long a writer waits for the document lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Name recorded in history entries when none is given
    #[serde(default)]
    pub actor: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            project_prefix: None,
            terminal_columns: default_terminal_columns(),
            lock_timeout_ms: default_lock_timeout_ms(),
            actor: None,
        }
    }
}

fn default_terminal_columns() -> Vec<String> {
    vec!["Done".to_string()]
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn is_terminal(&self, column_title: &str) -> bool {
        self.terminal_columns
            .iter()
            .any(|t| t.trim().eq_ignore_ascii_case(column_title.trim()))
    }

    /// The configured actor, then `$USER`, then a fixed fallback
    pub fn default_actor(&self) -> String {
        self.actor
            .clone()
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| "mdb".to_string())
    }

    /// Read `mdboard.toml` from `dir`. A missing file yields defaults.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(EngineConfig::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(toml::from_str(&text)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse mdboard.toml: {0}")]
    Parse(#[from] toml::de::Error),
}
