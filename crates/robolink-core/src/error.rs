// ── Core error types ──
//
// Errors surfaced by robolink-core. Consumers never see reqwest or
// tungstenite errors directly: `From<robolink_api::Error>` folds them into
// the variants below. None of these are fatal; the components that own a
// transport handle its failures and only report outcomes upward.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Cannot reach device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device is offline")]
    Offline,

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Invalid command '{name}': {message}")]
    InvalidCommand { name: String, message: String },

    #[error("Device rejected the request: {message}")]
    Rejected { message: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Malformed payload: {message}")]
    Protocol { message: String },

    #[error("Storage error for key '{key}': {message}")]
    Storage { key: String, message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transport-class failures: the device could not be reached in time.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Offline
        )
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<robolink_api::Error> for CoreError {
    fn from(err: robolink_api::Error) -> Self {
        use robolink_api::Error as Api;

        match err {
            Api::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            Api::Transport(ref e) if e.is_timeout() => Self::Timeout { timeout_ms: 0 },
            Api::Transport(ref e) => Self::ConnectionFailed {
                url: e
                    .url()
                    .map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            Api::WebSocketConnect(reason) => Self::ConnectionFailed {
                url: "<channel>".into(),
                reason,
            },
            Api::WebSocketClosed { code, reason } => Self::ConnectionFailed {
                url: "<channel>".into(),
                reason: format!("closed with code {code}: {reason}"),
            },
            Api::NotConnected => Self::Offline,
            Api::Deserialization { message, .. } => Self::Protocol { message },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("invalid URL: {e}"),
            },
            Api::ClientBuild(message) => Self::Config { message },
            Api::Cancelled => Self::Internal("operation cancelled".into()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }
}
