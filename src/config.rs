use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use journalscope_logs::{
    DEFAULT_BATCH_LIMIT, DEFAULT_LOAD_TIMEOUT, DEFAULT_OUTPUT_FORMAT, DEFAULT_PROGRAM,
    FilterState,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// How the log source is invoked
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub program: String,
    pub output_format: String,
    pub batch_limit: usize,
    pub load_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub tick_rate_ms: u64,
    pub show_timestamps: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_rate_ms: 250,
            show_timestamps: true,
        }
    }
}

/// Contents of `config.toml`; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub filter: FilterState,
    pub ui: UiConfig,
    pub plugins_dir: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit`, or from the default location if it exists
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(&expand_tilde(path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path() -> Option<PathBuf> {
        config_home().map(|dir| dir.join("config.toml"))
    }

    /// Rule plugin directory: the configured one, else `plugins/` next to the config
    pub fn plugins_dir(&self) -> Option<PathBuf> {
        match &self.plugins_dir {
            Some(dir) => Some(expand_tilde(dir)),
            None => config_home().map(|dir| dir.join("plugins")),
        }
    }
}

fn config_home() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("journalscope"))
}

/// Expand a leading `~/` to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    path.to_path_buf()
}
