//! Engine configuration
//!
//! Stored as camelCase JSON in `<config dir>/UsageBar/settings.json`. Every
//! key is optional; a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::detector;
use crate::providers::claude::DEFAULT_BASE_URL;
use crate::storage::credentials::default_credentials_path;
use crate::usage::{CountdownPolicy, DisplayZone};

/// Shortest and longest accepted data-loop period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(86_400);
/// Shortest and longest accepted UI tick
pub const MIN_UI_TICK: Duration = Duration::from_millis(50);
pub const MAX_UI_TICK: Duration = Duration::from_secs(60);

const APP_DIR_NAME: &str = "UsageBar";
const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub poll_interval_seconds: u64,
    pub ui_tick_millis: u64,
    pub countdown_policy: CountdownPolicy,
    pub show_model_limits: bool,
    pub request_timeout_seconds: u64,
    pub credential_cache_seconds: u64,
    pub credential_lookup_timeout_millis: u64,
    pub timezone: Option<String>,
    pub api_base_url: String,
    pub settings_path: Option<PathBuf>,
    pub model_override_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
    pub snapshot_export_path: Option<PathBuf>,
    pub file_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            ui_tick_millis: 1000,
            countdown_policy: CountdownPolicy::Tiered,
            show_model_limits: true,
            request_timeout_seconds: 10,
            credential_cache_seconds: 300,
            credential_lookup_timeout_millis: 5000,
            timezone: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            settings_path: detector::default_settings_path(),
            model_override_path: detector::default_override_path(),
            credentials_path: default_credentials_path(),
            snapshot_export_path: None,
            file_logging: false,
        }
    }
}

impl EngineConfig {
    /// Load from `path`, or from `USAGEBAR_CONFIG` / the default location,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var("USAGEBAR_CONFIG")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .or_else(default_config_path),
        };

        let mut config = match path {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read a config file; a file that does not exist yields defaults
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("USAGEBAR_POLL_INTERVAL") {
            match value.trim().parse::<u64>() {
                Ok(seconds) => self.poll_interval_seconds = seconds,
                Err(_) => tracing::warn!("Ignoring invalid USAGEBAR_POLL_INTERVAL={:?}", value),
            }
        }

        if let Ok(url) = std::env::var("USAGEBAR_API_BASE") {
            let cleaned = url.trim();
            if !cleaned.is_empty() {
                self.api_base_url = cleaned.to_string();
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    }

    pub fn ui_tick(&self) -> Duration {
        Duration::from_millis(self.ui_tick_millis).clamp(MIN_UI_TICK, MAX_UI_TICK)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn credential_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_cache_seconds)
    }

    pub fn credential_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.credential_lookup_timeout_millis.max(1))
    }

    pub fn display_zone(&self) -> DisplayZone {
        DisplayZone::resolve(self.timezone.as_deref())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILENAME))
}
