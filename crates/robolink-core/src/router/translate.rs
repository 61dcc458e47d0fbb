// ── Channel message → typed updates ──
//
// Device events arrive as `{ type, ...payload }`. Some firmware wraps the
// payload in a `data` object; both shapes are accepted.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use robolink_api::{ChannelMessage, Topic};

use crate::error::CoreError;
use crate::model::{
    BatteryDelta, ConnectivityDelta, OperatingStatus, PositionDelta, ProgressDelta, StatePatch,
    Update,
};

/// Keys a bare status event may carry besides `status`.
const STATUS_ENVELOPE_KEYS: [&str; 3] = ["status", "timestamp", "robotId"];

/// Translate a device event into updates.
///
/// Returns `Ok(vec![])` for topics that carry no state (pongs, unknown
/// types) and `Err(Protocol)` for device events with unusable payloads.
pub fn translate(message: &ChannelMessage) -> Result<Vec<Update>, CoreError> {
    let payload = body(message);

    match message.topic() {
        Topic::RobotStatusUpdate => status_update(&payload).map(|u| vec![u]),
        Topic::RobotPositionUpdate => {
            let source = payload.get("position").map_or_else(
                || Value::Object(payload.clone()),
                Clone::clone,
            );
            let delta: PositionDelta = parse(source)?;
            if delta == PositionDelta::default() {
                return Err(CoreError::protocol("position update without coordinates"));
            }
            Ok(vec![Update::Position(delta)])
        }
        Topic::CleaningProgressUpdate => progress_updates(&payload),
        Topic::BatteryUpdate => {
            let mut object = payload.clone();
            // Some firmware reports `level` instead of `percentage`.
            if let Some(level) = object.remove("level") {
                object.entry("percentage").or_insert(level);
            }
            let delta: BatteryDelta = parse(Value::Object(object))?;
            if delta == BatteryDelta::default() {
                return Err(CoreError::protocol("battery update without fields"));
            }
            Ok(vec![Update::Battery(delta)])
        }
        Topic::ConnectivityUpdate => {
            let delta: ConnectivityDelta = parse(Value::Object(payload))?;
            if delta == ConnectivityDelta::default() {
                return Err(CoreError::protocol("connectivity update without fields"));
            }
            Ok(vec![Update::Connectivity(delta)])
        }
        Topic::ErrorNotification => {
            let text = ["message", "error", "code"]
                .into_iter()
                .find_map(|key| payload.get(key).and_then(Value::as_str))
                .unwrap_or("Unknown error")
                .to_owned();
            Ok(vec![Update::Status {
                status: OperatingStatus::Error,
                error: Some(text),
            }])
        }
        _ => Ok(Vec::new()),
    }
}

fn body(message: &ChannelMessage) -> Map<String, Value> {
    match message.payload.get("data") {
        Some(Value::Object(inner)) => inner.clone(),
        _ => message.payload.clone(),
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, CoreError> {
    serde_json::from_value(value).map_err(|e| CoreError::protocol(e.to_string()))
}

fn status_update(payload: &Map<String, Value>) -> Result<Update, CoreError> {
    let bare = payload
        .keys()
        .all(|key| STATUS_ENVELOPE_KEYS.contains(&key.as_str()));

    if bare {
        let status = payload
            .get("status")
            .cloned()
            .ok_or_else(|| CoreError::protocol("status update without status"))?;
        return Ok(Update::status(parse(status)?));
    }

    let patch: StatePatch = parse(Value::Object(payload.clone()))?;
    Ok(Update::FullState(Box::new(patch)))
}

fn progress_updates(payload: &Map<String, Value>) -> Result<Vec<Update>, CoreError> {
    let mut object = payload.clone();
    if let Some(progress) = object.remove("progress") {
        // `{ progress: 42 }` or `{ progress: { percentage, ... } }`
        match progress {
            Value::Object(inner) => {
                for (key, value) in inner {
                    object.entry(key).or_insert(value);
                }
            }
            other => {
                object.entry("percentage").or_insert(other);
            }
        }
    }

    let duration = object
        .remove("estimatedDuration")
        .or_else(|| object.remove("estimatedTimeRemaining"));

    let delta: ProgressDelta = parse(Value::Object(object))?;
    let mut updates = Vec::with_capacity(2);
    if delta != ProgressDelta::default() {
        updates.push(Update::TaskProgress(delta));
    }
    if let Some(duration) = duration {
        let minutes: u32 = parse(duration)?;
        updates.push(Update::TaskDuration {
            estimated_duration: minutes,
        });
    }

    if updates.is_empty() {
        return Err(CoreError::protocol("progress update without fields"));
    }
    Ok(updates)
}
