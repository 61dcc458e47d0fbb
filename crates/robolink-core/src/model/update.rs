// ── Typed updates ──
//
// Every mutation of `DeviceState` is one of these. Deltas carry only the
// fields that changed (`None` = untouched), so replaying an update is
// idempotent.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::OperatingStatus;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryDelta {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub is_charging: Option<bool>,
    #[serde(default)]
    pub estimated_runtime: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityDelta {
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub signal_strength: Option<i32>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionDelta {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDelta {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub area_covered: Option<f64>,
    #[serde(default)]
    pub current_zone: Option<String>,
}

/// Task fields of a full-state payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub progress: Option<ProgressDelta>,
}

/// A full-state payload, as returned by `GET /status` or pushed in a rich
/// status event. Every field is optional.
///
/// `task` distinguishes absent (`None`, keep the current task) from an
/// explicit `null` (`Some(None)`, clear it).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<OperatingStatus>,
    #[serde(default)]
    pub battery: Option<BatteryDelta>,
    #[serde(default)]
    pub connectivity: Option<ConnectivityDelta>,
    #[serde(default)]
    pub position: Option<PositionDelta>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub task: Option<Option<TaskPatch>>,
    #[serde(default)]
    pub capabilities: Option<BTreeMap<String, bool>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ── Update ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Status change, optionally with the error that caused it.
    Status {
        status: OperatingStatus,
        error: Option<String>,
    },
    Battery(BatteryDelta),
    Position(PositionDelta),
    Connectivity(ConnectivityDelta),
    /// Progress of the active task; starts a task if none is running.
    TaskProgress(ProgressDelta),
    /// Revised estimate for the active task, in minutes.
    TaskDuration { estimated_duration: u32 },
    /// Capability flags to set; flags not named are kept.
    Capabilities(BTreeMap<String, bool>),
    FullState(Box<StatePatch>),
}

impl Update {
    pub fn status(status: OperatingStatus) -> Self {
        Self::Status {
            status,
            error: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Battery(_) => "battery",
            Self::Position(_) => "position",
            Self::Connectivity(_) => "connectivity",
            Self::TaskProgress(_) => "task_progress",
            Self::TaskDuration { .. } => "task_duration",
            Self::Capabilities(_) => "capabilities",
            Self::FullState(_) => "full_state",
        }
    }
}

// ── Source ───────────────────────────────────────────────────────────

/// Where an update came from. Used for logging only; the reducer treats
/// every source alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Realtime channel event.
    Channel,
    /// Full-state poll.
    Poll,
    /// Secondary local wireless transport.
    Local,
    /// Connectivity probe of the command dispatcher.
    Probe,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Channel => "channel",
            Self::Poll => "poll",
            Self::Local => "local",
            Self::Probe => "probe",
        })
    }
}

/// An update tagged with its origin, as carried to the merge task.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedUpdate {
    pub source: Source,
    pub update: Update,
}

impl SourcedUpdate {
    pub fn new(source: Source, update: Update) -> Self {
        Self { source, update }
    }
}
