use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

use crate::alerts::AlertPolicy;
use crate::error::ConfigError;
use crate::logs::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_HISTORY, DEFAULT_RETENTION_DAYS};
use crate::monitors::probe::DEFAULT_PROBE_TIMEOUT;
use crate::util::{self, get_default_failure_threshold};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint list (JSON array of `{name, url, keywords}`)
    pub sites_file: PathBuf,

    pub log_file: PathBuf,

    pub notification_state_file: PathBuf,

    /// Seconds between two poll cycles
    pub interval_secs: u64,

    /// Per-request and per-handshake timeout in seconds
    pub timeout_secs: u64,

    /// Lines kept in memory
    pub log_history: usize,

    pub log_retention_days: u32,

    pub log_cleanup_interval_secs: u64,

    pub alert: AlertSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites_file: PathBuf::from("sites.json"),
            log_file: PathBuf::from("logs/uptime.log"),
            notification_state_file: PathBuf::from("notification_state.json"),
            interval_secs: default_interval(),
            timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            log_history: DEFAULT_HISTORY,
            log_retention_days: DEFAULT_RETENTION_DAYS,
            log_cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            alert: AlertSettings::default(),
        }
    }
}

impl Config {
    /// Read the optional config file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => read_config_file(path)?,
            None => Config::default(),
        };
        Ok(config.with_overrides(util::env_var))
    }

    /// Apply `TELEGRAM_*` overrides from the given variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(util::TELEGRAM_BOT_TOKEN) {
            self.alert.bot_token = token;
        }
        if let Some(chat_id) = lookup(util::TELEGRAM_CHAT_ID) {
            self.alert.chat_id = chat_id;
        }
        if let Some(enabled) = lookup(util::TELEGRAM_ENABLED) {
            self.alert.enabled = util::parse_enabled(&enabled);
        }
        if let Some(threshold) = lookup(util::TELEGRAM_FAILURE_THRESHOLD) {
            self.alert.failure_threshold = util::parse_failure_threshold(&threshold);
        }
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn log_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.log_cleanup_interval_secs)
    }
}

/// Alert transport settings; read-only once loaded
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub enabled: bool,

    /// Consecutive failures before the first down alert
    pub failure_threshold: u32,

    /// Down alerts allowed after the first one within an outage, `null` for no cap
    pub max_escalation_alerts: Option<u32>,

    pub api_base: String,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            enabled: false,
            failure_threshold: get_default_failure_threshold(),
            max_escalation_alerts: Some(default_max_escalation_alerts()),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }
}

impl AlertSettings {
    /// Token, chat id and the enabled flag must all be set
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty() && self.enabled
    }

    pub fn policy(&self) -> AlertPolicy {
        AlertPolicy {
            failure_threshold: self.failure_threshold,
            max_escalation_alerts: self.max_escalation_alerts,
        }
    }
}

impl fmt::Debug for AlertSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertSettings")
            .field("bot_token", &if self.bot_token.is_empty() { "" } else { "<redacted>" })
            .field("chat_id", &self.chat_id)
            .field("enabled", &self.enabled)
            .field("failure_threshold", &self.failure_threshold)
            .field("max_escalation_alerts", &self.max_escalation_alerts)
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn default_interval() -> u64 {
    30
}

fn default_max_escalation_alerts() -> u32 {
    3
}

pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let file_content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&file_content)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
        .inspect(|config| trace!("loaded config: {config:?}"))
}
