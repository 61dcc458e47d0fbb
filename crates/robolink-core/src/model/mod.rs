// ── Domain model ──
//
// The single synchronized snapshot of the device, plus the typed updates
// that mutate it. Wire format is camelCase JSON, shared by the persisted
// snapshot and full-state payloads from the device.

mod history;
mod update;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use history::HistoryEntry;
pub use update::{
    BatteryDelta, ConnectivityDelta, PositionDelta, ProgressDelta, Source, SourcedUpdate,
    StatePatch, TaskPatch, Update,
};

// ── Operating status ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingStatus {
    #[default]
    Idle,
    Cleaning,
    Paused,
    Returning,
    Docked,
    Error,
}

impl OperatingStatus {
    /// Whether `self → next` follows the expected cleaning cycle:
    /// idle → cleaning ↔ paused, cleaning → returning → docked → idle,
    /// any → error → idle. Staying put is always expected.
    pub fn expects_transition_to(self, next: Self) -> bool {
        use OperatingStatus::{Cleaning, Docked, Error, Idle, Paused, Returning};

        self == next
            || next == Error
            || matches!(
                (self, next),
                (Idle, Cleaning)
                    | (Cleaning, Paused | Returning)
                    | (Paused, Cleaning | Returning)
                    | (Returning, Docked)
                    | (Docked | Error, Idle)
            )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Cleaning => "cleaning",
            Self::Paused => "paused",
            Self::Returning => "returning",
            Self::Docked => "docked",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Nested state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battery {
    /// 0..=100
    pub percentage: u8,
    pub is_charging: bool,
    /// Minutes of runtime left.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_runtime: Option<u32>,
}

impl Default for Battery {
    fn default() -> Self {
        Self {
            percentage: 100,
            is_charging: false,
            estimated_runtime: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    /// Heading in degrees.
    pub rotation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    /// 0.0..=100.0
    pub percentage: f64,
    /// Square metres.
    pub area_covered: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTask {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub progress: TaskProgress,
}

impl Default for ActiveTask {
    fn default() -> Self {
        Self {
            mode: "auto".into(),
            started_at: None,
            estimated_duration: None,
            progress: TaskProgress::default(),
        }
    }
}

// ── DeviceState ──────────────────────────────────────────────────────

/// The synchronized snapshot of the remote device.
///
/// Exactly one live instance exists, owned by [`StateStore`](crate::StateStore);
/// everyone else reads `Arc` snapshots of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: OperatingStatus,
    #[serde(default)]
    pub battery: Battery,
    #[serde(default)]
    pub connectivity: Connectivity,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub task: Option<ActiveTask>,
    #[serde(default)]
    pub capabilities: BTreeMap<String, bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            id: "robot".into(),
            name: None,
            status: OperatingStatus::Idle,
            battery: Battery::default(),
            connectivity: Connectivity::default(),
            position: Position::default(),
            task: None,
            capabilities: BTreeMap::new(),
            last_error: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn status_cycle_expectations() {
        use OperatingStatus::{Cleaning, Docked, Error, Idle, Paused, Returning};

        assert!(Idle.expects_transition_to(Cleaning));
        assert!(Cleaning.expects_transition_to(Paused));
        assert!(Paused.expects_transition_to(Cleaning));
        assert!(Returning.expects_transition_to(Docked));
        assert!(Docked.expects_transition_to(Idle));
        assert!(Docked.expects_transition_to(Error));
        assert!(Error.expects_transition_to(Idle));

        assert!(!Idle.expects_transition_to(Docked));
        assert!(!Error.expects_transition_to(Cleaning));
    }

    #[test]
    fn persisted_snapshot_uses_camel_case() {
        let mut state = DeviceState::default();
        state.battery.is_charging = true;
        state.last_error = Some("brush stuck".into());

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["battery"]["isCharging"], json!(true));
        assert_eq!(value["lastError"], json!("brush stuck"));
        assert_eq!(value["connectivity"]["isOnline"], json!(false));
        assert_eq!(value["task"], json!(null));

        let back: DeviceState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn sparse_snapshot_fills_defaults() {
        let state: DeviceState = serde_json::from_value(json!({ "id": "rv-9" })).unwrap();
        assert_eq!(state.id, "rv-9");
        assert_eq!(state.battery.percentage, 100);
        assert_eq!(state.status, OperatingStatus::Idle);
    }
}
