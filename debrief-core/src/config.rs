//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/debrief/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/debrief/` (~/.config/debrief/)
//! - Data: `$XDG_DATA_HOME/debrief/` (~/.local/share/debrief/)
//! - State/Logs/Locks: `$XDG_STATE_HOME/debrief/` (~/.local/state/debrief/)
//!
//! Every path a component touches can be overridden in the `[paths]` section,
//! and components take resolved paths at construction so tests can point them
//! at temporary directories.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Remote summarizer configuration
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path overrides
    #[serde(default)]
    pub paths: PathOverrides,
}

/// Remote summarizer (Anthropic Messages API) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    /// Model to use for briefings
    #[serde(default = "default_summarizer_model")]
    pub model: String,

    /// API endpoint base URL
    #[serde(default = "default_summarizer_endpoint")]
    pub endpoint: String,

    /// API key; falls back to DEBRIEF_API_KEY / ANTHROPIC_API_KEY env vars
    pub api_key: Option<String>,

    /// Retry attempts for malformed responses
    #[serde(default = "default_summarizer_max_retries")]
    pub max_retries: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_summarizer_timeout")]
    pub timeout_secs: u64,

    /// Input cap in characters for conversation + diff text
    #[serde(default = "default_summarizer_max_input")]
    pub max_input_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: default_summarizer_model(),
            endpoint: default_summarizer_endpoint(),
            api_key: None,
            max_retries: default_summarizer_max_retries(),
            timeout_secs: default_summarizer_timeout(),
            max_input_chars: default_summarizer_max_input(),
        }
    }
}

impl SummarizerConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("DEBRIEF_API_KEY").ok())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

fn default_summarizer_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_summarizer_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_summarizer_max_retries() -> usize {
    2
}

fn default_summarizer_timeout() -> u64 {
    60
}

fn default_summarizer_max_input() -> usize {
    150_000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Optional overrides for every directory debrief touches
#[derive(Debug, Deserialize, Default)]
pub struct PathOverrides {
    /// Claude Code projects directory (default ~/.claude/projects)
    pub projects_dir: Option<PathBuf>,
    /// Claude Code settings file (default ~/.claude/settings.json)
    pub claude_settings: Option<PathBuf>,
    /// Briefing output directory
    pub briefings_dir: Option<PathBuf>,
    /// Accumulated insights directory
    pub insights_dir: Option<PathBuf>,
    /// Lock marker directory
    pub locks_dir: Option<PathBuf>,
    /// Background analysis log directory
    pub logs_dir: Option<PathBuf>,
    /// Prompt store database file
    pub store_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("debrief").join("config.toml")
    }

    /// Returns the data directory path (briefings, insights, prompt store)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("debrief")
    }

    /// Returns the state directory path (logs, lock markers)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("debrief")
    }

    /// Returns the application log file directory
    pub fn log_dir() -> PathBuf {
        Self::state_dir()
    }

    /// Claude Code projects directory holding one subdirectory per project
    pub fn projects_dir(&self) -> PathBuf {
        self.paths
            .projects_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude").join("projects"))
    }

    /// Claude Code settings file the hook installer patches
    pub fn claude_settings_path(&self) -> PathBuf {
        self.paths
            .claude_settings
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude").join("settings.json"))
    }

    /// Directory briefings are persisted into
    pub fn briefings_dir(&self) -> PathBuf {
        self.paths
            .briefings_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("briefings"))
    }

    /// Directory accumulated insight records are persisted into
    pub fn insights_dir(&self) -> PathBuf {
        self.paths
            .insights_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("insights"))
    }

    /// Directory lock markers live in
    pub fn locks_dir(&self) -> PathBuf {
        self.paths
            .locks_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("locks"))
    }

    /// Directory background analysis logs are written to
    pub fn logs_dir(&self) -> PathBuf {
        self.paths
            .logs_dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("logs"))
    }

    /// Prompt store database file path
    pub fn store_path(&self) -> PathBuf {
        self.paths
            .store_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("debrief.db"))
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.summarizer.max_retries, 2);
        assert_eq!(config.summarizer.max_input_chars, 150_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.paths.projects_dir.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[summarizer]
model = "claude-sonnet-4-5"
max_retries = 4

[logging]
level = "debug"

[paths]
briefings_dir = "/tmp/briefings"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.summarizer.model, "claude-sonnet-4-5");
        assert_eq!(config.summarizer.max_retries, 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.briefings_dir(),
            PathBuf::from("/tmp/briefings")
        );
    }

    #[test]
    fn test_default_paths_are_rooted() {
        let config = Config::default();
        assert!(config.projects_dir().ends_with(".claude/projects"));
        assert!(config.locks_dir().ends_with("debrief/locks"));
        assert!(config.store_path().ends_with("debrief/debrief.db"));
    }
}
