//! Configuration loading
//!
//! Configuration is read from `$XDG_CONFIG_HOME/study-pulse/config.toml`
//! (~/.config/study-pulse/config.toml). A missing file means defaults.
//!
//! ```toml
//! retention_days = 90
//! max_events_per_user = 1000
//! utc_offset_minutes = 120
//! notify_high_priority = true
//! data_dir = "/var/lib/study-pulse"
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{InsightError, Result};
use crate::store::{DEFAULT_MAX_EVENTS, DEFAULT_RETENTION_DAYS};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "study-pulse";

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

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    /// Events older than this many days are removed by `prune`
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Per-user event cap; the oldest events are dropped beyond it
    #[serde(default = "default_max_events")]
    pub max_events_per_user: usize,

    /// The learner's UTC offset, used for calendar days and hours
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Forward high-priority insights to the notifier
    #[serde(default = "default_notify")]
    pub notify_high_priority: bool,

    /// Override for the file store directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            max_events_per_user: default_max_events(),
            utc_offset_minutes: 0,
            notify_high_priority: default_notify(),
            data_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

fn default_notify() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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

impl PulseConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::debug!("No config file found at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            InsightError::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PulseConfig = toml::from_str(content)
            .map_err(|e| InsightError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention_days < 1 {
            return Err(InsightError::Config(
                "retention_days must be at least 1".to_string(),
            ));
        }
        if self.max_events_per_user == 0 {
            return Err(InsightError::Config(
                "max_events_per_user must be at least 1".to_string(),
            ));
        }
        self.utc_offset()?;
        Ok(())
    }

    /// The configured offset as a chrono `FixedOffset`
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            InsightError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/study-pulse/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Directory for the file store: `data_dir` if set, otherwise
    /// `$XDG_DATA_HOME/study-pulse/`
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| xdg_data_home().join(APP_DIR))
    }
}
