//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use robolink_config::ConfigError;
use robolink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the robot at {url}")]
    #[diagnostic(
        code(robolink::connection_failed),
        help(
            "Check that the robot is powered on and on the same network.\n\
             Set api_url in the config file or ROBOLINK_API_URL."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Robot did not answer within {timeout_ms}ms")]
    #[diagnostic(
        code(robolink::timeout),
        help("Raise request_timeout_ms (or ROBOLINK_REQUEST_TIMEOUT_MS) or check the robot's Wi-Fi signal.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("Command '{command}' was not delivered")]
    #[diagnostic(
        code(robolink::not_delivered),
        help("The robot was unreachable or refused it. Run `robolink status` to check connectivity.")
    )]
    NotDelivered { command: String },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid command '{name}': {message}")]
    #[diagnostic(code(robolink::invalid_command))]
    InvalidCommand { name: String, message: String },

    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(robolink::validation))]
    Validation { field: String, reason: String },

    #[error("Robot rejected the request: {message}")]
    #[diagnostic(code(robolink::rejected))]
    Rejected { message: String },

    #[error("Robot sent an unreadable payload: {message}")]
    #[diagnostic(code(robolink::protocol))]
    Protocol { message: String },

    // ── Config / storage ─────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(robolink::config),
        help("Run `robolink config path` to locate the file, or `robolink config init` to create one.")
    )]
    Config(String),

    #[error("Config file already exists at {path}")]
    #[diagnostic(code(robolink::config_exists), help("Pass --force to overwrite it."))]
    ConfigExists { path: String },

    #[error("Storage error for '{key}': {message}")]
    #[diagnostic(code(robolink::storage))]
    Storage { key: String, message: String },

    #[error("Internal error: {0}")]
    #[diagnostic(code(robolink::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(robolink::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NotDelivered { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::InvalidCommand { .. } | Self::Validation { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            Self::Rejected { .. } => exit_code::REJECTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Offline => Self::ConnectionFailed {
                url: "(offline)".into(),
                reason: "robot marked offline".into(),
            },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::InvalidCommand { name, message } => Self::InvalidCommand { name, message },
            CoreError::Rejected { message } => Self::Rejected { message },
            CoreError::Protocol { message } => Self::Protocol { message },
            CoreError::Storage { key, message } => Self::Storage { key, message },
            CoreError::Config { message } => Self::Config(message),
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Render(err.to_string())
    }
}
