//! Configuration for robolink tools.
//!
//! Flat TOML settings layered with `ROBOLINK_*` environment variables, and
//! translation to `robolink_core::SyncConfig`. The core never reads
//! config files; hosts load [`Settings`] here and hand the result in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use robolink_api::ReconnectConfig;
use robolink_core::SyncConfig;

const ENV_PREFIX: &str = "ROBOLINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Every tunable, as it appears in `config.toml`. Durations are in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Realtime channel endpoint.
    pub channel_url: String,
    /// HTTP command surface.
    pub api_url: String,

    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub max_queue_len: usize,
    pub flush_delay_ms: u64,

    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    /// Reconnect attempts before the channel gives up.
    pub reconnect_max_attempts: u32,
    /// Ignore `reconnect_max_attempts` and retry forever.
    pub reconnect_forever: bool,
    pub connect_timeout_ms: u64,
    /// 0 disables keepalive pings.
    pub ping_interval_ms: u64,

    pub foreground_poll_ms: u64,
    pub background_poll_ms: u64,

    pub low_battery_threshold: u8,
    pub accept_invalid_certs: bool,

    /// Where the CLI persists device state. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        Self {
            channel_url: "ws://localhost:5000/ws".into(),
            api_url: "http://localhost:5000".into(),
            request_timeout_ms: 10_000,
            max_retries: 3,
            max_queue_len: 50,
            flush_delay_ms: 50,
            reconnect_base_ms: millis(reconnect.base_delay),
            reconnect_cap_ms: millis(reconnect.max_delay),
            reconnect_max_attempts: reconnect.max_attempts.unwrap_or(5),
            reconnect_forever: false,
            connect_timeout_ms: 10_000,
            ping_interval_ms: 0,
            foreground_poll_ms: 10_000,
            background_poll_ms: 30_000,
            low_battery_threshold: 20,
            accept_invalid_certs: false,
            data_dir: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Settings {
    /// Validate and convert into the core's runtime config.
    pub fn into_sync_config(self) -> Result<SyncConfig, ConfigError> {
        let channel_url = parse_url("channel_url", &self.channel_url, &["ws", "wss"])?;
        let api_url = parse_url("api_url", &self.api_url, &["http", "https"])?;

        for (field, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("reconnect_base_ms", self.reconnect_base_ms),
            ("foreground_poll_ms", self.foreground_poll_ms),
            ("background_poll_ms", self.background_poll_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if self.max_queue_len == 0 {
            return Err(invalid("max_queue_len", "must be greater than zero"));
        }
        if self.reconnect_cap_ms < self.reconnect_base_ms {
            return Err(invalid(
                "reconnect_cap_ms",
                format!(
                    "{} is below reconnect_base_ms ({})",
                    self.reconnect_cap_ms, self.reconnect_base_ms
                ),
            ));
        }
        if self.low_battery_threshold > 100 {
            return Err(invalid(
                "low_battery_threshold",
                format!("{} is not a percentage", self.low_battery_threshold),
            ));
        }

        let mut config = SyncConfig::new(channel_url, api_url);
        config.request_timeout = Duration::from_millis(self.request_timeout_ms);
        config.max_retries = self.max_retries;
        config.max_queue_len = self.max_queue_len;
        config.flush_delay = Duration::from_millis(self.flush_delay_ms);
        config.reconnect = ReconnectConfig {
            base_delay: Duration::from_millis(self.reconnect_base_ms),
            max_delay: Duration::from_millis(self.reconnect_cap_ms),
            max_attempts: (!self.reconnect_forever).then_some(self.reconnect_max_attempts),
        };
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config.ping_interval = Duration::from_millis(self.ping_interval_ms);
        config.foreground_poll = Duration::from_millis(self.foreground_poll_ms);
        config.background_poll = Duration::from_millis(self.background_poll_ms);
        config.low_battery_threshold = self.low_battery_threshold;
        config.accept_invalid_certs = self.accept_invalid_certs;
        Ok(config)
    }

    /// Configured data dir, or the platform default.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_dir)
    }
}

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(field, format!("'{raw}': {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(
            field,
            format!("scheme must be one of {}, got '{}'", schemes.join(", "), url.scheme()),
        ));
    }
    Ok(url)
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "robolink", "robolink")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "robolink", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform data directory for persisted state.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "robolink"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Defaults, then the TOML file (`path` or [`config_path()`]), then
/// `ROBOLINK_*` environment variables. A missing file is not an error.
pub fn figment(path: Option<&Path>) -> Figment {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    Ok(figment(path).extract()?)
}

/// Write settings as TOML, creating parent directories. Returns the path
/// written.
pub fn save_settings(settings: &Settings, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(&path, toml_str)?;
    Ok(path)
}
