use thiserror::Error;

/// Top-level error type for the `robolink-api` crate.
///
/// Covers every failure mode of the two transports: the HTTP command
/// surface and the realtime WebSocket channel. `robolink-core` maps these
/// into its own error type and never lets them reach the UI layer.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request or connect deadline elapsed.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The channel is not open.
    #[error("Channel is not connected")]
    NotConnected,

    /// A connect attempt was superseded by a teardown or a newer attempt.
    #[error("Connect attempt was cancelled")]
    Cancelled,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::NotConnected => true,
            _ => false,
        }
    }

    /// Returns `true` if the device could not be reached at all, as opposed
    /// to answering with something we could not use.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Timeout { .. } | Self::NotConnected => true,
            _ => false,
        }
    }

    pub(crate) fn timeout(deadline: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeout_is_transient_and_unreachable() {
        let err = Error::timeout(Duration::from_millis(1500));
        assert!(err.is_transient());
        assert!(err.is_unreachable());
        assert_eq!(err.to_string(), "Request timed out after 1500ms");
    }

    #[test]
    fn deserialization_is_not_transient() {
        let err = Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_unreachable());
    }
}
