use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// A command waiting in the outbound queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedCommand {
    pub id: Uuid,
    pub name: String,
    pub params: Value,
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts made from the queue.
    pub retry_count: u32,
}

impl QueuedCommand {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            params,
            enqueued_at: Utc::now(),
            retry_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Evicted to keep the queue within capacity.
    Capacity,
    /// Failed as many times as the retry limit allows.
    RetriesExhausted,
    /// Could not be routed, so it was never attempted.
    Invalid,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Capacity => "capacity",
            Self::RetriesExhausted => "retries exhausted",
            Self::Invalid => "invalid",
        })
    }
}

/// Notice published when a queued command is discarded for good.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedCommand {
    pub command: QueuedCommand,
    pub reason: DropReason,
}
