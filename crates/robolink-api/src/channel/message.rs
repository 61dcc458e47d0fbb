// ── Channel wire envelopes ──
//
// Every frame on the realtime channel is a JSON object of the shape
// `{ "type": "<topic>", ...payload }`. The `type` field selects the topic
// handlers are dispatched to; everything else is carried untouched.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ── Topic ────────────────────────────────────────────────────────────

/// Event topic handlers subscribe to.
///
/// Covers the lifecycle events raised locally by the channel, the device
/// events pushed by the remote side, and the control messages the client
/// sends. Unknown wire types are preserved in [`Topic::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    // Lifecycle (raised locally)
    Connected,
    Disconnected,
    Error,
    MaxReconnectAttemptsReached,

    // Device events
    RobotStatusUpdate,
    RobotPositionUpdate,
    CleaningProgressUpdate,
    BatteryUpdate,
    ConnectivityUpdate,
    ErrorNotification,

    // Control
    Subscribe,
    Unsubscribe,
    RequestStatusUpdate,
    Ping,
    Pong,

    Other(String),
}

impl Topic {
    /// Device event topics a client normally subscribes to.
    pub const DEVICE_EVENTS: [Topic; 6] = [
        Topic::RobotStatusUpdate,
        Topic::RobotPositionUpdate,
        Topic::CleaningProgressUpdate,
        Topic::BatteryUpdate,
        Topic::ConnectivityUpdate,
        Topic::ErrorNotification,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::MaxReconnectAttemptsReached => "max_reconnect_attempts_reached",
            Self::RobotStatusUpdate => "robot_status_update",
            Self::RobotPositionUpdate => "robot_position_update",
            Self::CleaningProgressUpdate => "cleaning_progress_update",
            Self::BatteryUpdate => "battery_update",
            Self::ConnectivityUpdate => "connectivity_update",
            Self::ErrorNotification => "error_notification",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::RequestStatusUpdate => "request_status_update",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Other(s) => s,
        }
    }

    /// Whether this topic is raised by the channel itself rather than
    /// received from the wire.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Disconnected | Self::Error | Self::MaxReconnectAttemptsReached
        )
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        match s {
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "error" => Self::Error,
            "max_reconnect_attempts_reached" => Self::MaxReconnectAttemptsReached,
            "robot_status_update" => Self::RobotStatusUpdate,
            "robot_position_update" => Self::RobotPositionUpdate,
            "cleaning_progress_update" => Self::CleaningProgressUpdate,
            "battery_update" => Self::BatteryUpdate,
            "connectivity_update" => Self::ConnectivityUpdate,
            "error_notification" => Self::ErrorNotification,
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            "request_status_update" => Self::RequestStatusUpdate,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ChannelMessage ───────────────────────────────────────────────────

/// A single `{ type, ...payload }` envelope.
///
/// Uses `#[serde(flatten)]` so every field beyond `type` is kept in
/// `payload` and nothing the device sends is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ChannelMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Builder-style payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// `{ "type": "subscribe", "topic": ... }`
    pub fn subscribe(topic: &Topic) -> Self {
        Self::new(Topic::Subscribe.as_str()).with("topic", topic.as_str())
    }

    /// `{ "type": "unsubscribe", "topic": ... }`
    pub fn unsubscribe(topic: &Topic) -> Self {
        Self::new(Topic::Unsubscribe.as_str()).with("topic", topic.as_str())
    }

    /// Lightweight "push me your current state" signal.
    pub fn request_status() -> Self {
        Self::new(Topic::RequestStatusUpdate.as_str())
    }

    pub fn ping() -> Self {
        Self::new(Topic::Ping.as_str())
    }

    pub fn topic(&self) -> Topic {
        Topic::from(self.kind.as_str())
    }

    /// The payload as a JSON object value (without `type`).
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })
    }

    /// Serialize to a text frame.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })
    }
}

// ── ChannelEvent ─────────────────────────────────────────────────────

/// What handlers registered with [`Channel::on`](super::Channel::on) receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The socket opened.
    Connected,
    /// The socket closed, remotely or locally.
    Disconnected { reason: Option<String> },
    /// A connect attempt or the socket failed.
    Error { message: String },
    /// Auto-reconnect gave up; `connect()` must be called again.
    MaxReconnectAttemptsReached { attempts: u32 },
    /// A well-formed envelope from the remote side.
    Message(ChannelMessage),
}

impl ChannelEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Connected => Topic::Connected,
            Self::Disconnected { .. } => Topic::Disconnected,
            Self::Error { .. } => Topic::Error,
            Self::MaxReconnectAttemptsReached { .. } => Topic::MaxReconnectAttemptsReached,
            Self::Message(msg) => msg.topic(),
        }
    }

    pub fn as_message(&self) -> Option<&ChannelMessage> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }
}
