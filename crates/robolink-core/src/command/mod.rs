// ── Command routing ──
//
// Maps a command name plus JSON parameters onto the device's HTTP
// surface. Motion and component toggles have dedicated GET routes; any
// other command is POSTed to `/commands/{name}` with its parameters.

mod queued;

use serde_json::Value;

use robolink_api::CommandRequest;

use crate::error::CoreError;

pub use queued::{DropReason, DroppedCommand, QueuedCommand};

pub const DIRECTIONS: [&str; 5] = ["forward", "backward", "left", "right", "stop"];
pub const COMPONENTS: [&str; 4] = ["pump", "vacuum", "centre", "side"];

/// Build the request for `name` with `params`.
///
/// Fails for unknown directions/components or a non-object parameter set,
/// so invalid commands are rejected before they reach the queue.
pub fn route(name: &str, params: &Value) -> Result<CommandRequest, CoreError> {
    match name {
        "move" => {
            let direction = string_param(name, params, "direction")?;
            choice(name, "direction", direction, &DIRECTIONS)?;
            Ok(CommandRequest::get(format!("/move/{direction}")))
        }
        "stop" => Ok(CommandRequest::get("/move/stop")),
        "toggle" => {
            let component = string_param(name, params, "component")?;
            choice(name, "component", component, &COMPONENTS)?;
            Ok(CommandRequest::get(format!("/toggle/{component}")))
        }
        "get_status" => Ok(CommandRequest::get("/status")),
        _ => {
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(invalid(name, "command names are [A-Za-z0-9_-]+"));
            }
            let body = match params {
                Value::Null => Value::Object(serde_json::Map::new()),
                Value::Object(_) => params.clone(),
                _ => return Err(invalid(name, "parameters must be a JSON object")),
            };
            Ok(CommandRequest::post(format!("/commands/{name}"), body))
        }
    }
}

fn string_param<'a>(name: &str, params: &'a Value, key: &str) -> Result<&'a str, CoreError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(name, &format!("missing string parameter '{key}'")))
}

fn choice(name: &str, key: &str, value: &str, allowed: &[&str]) -> Result<(), CoreError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            name,
            &format!("{key} must be one of {}, got '{value}'", allowed.join(", ")),
        ))
    }
}

fn invalid(name: &str, message: &str) -> CoreError {
    CoreError::InvalidCommand {
        name: name.to_owned(),
        message: message.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use robolink_api::Method;
    use serde_json::json;

    use super::*;

    #[test]
    fn motion_and_toggle_routes() {
        let req = route("move", &json!({ "direction": "left" })).unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/move/left");

        assert_eq!(route("stop", &Value::Null).unwrap().path, "/move/stop");
        assert_eq!(
            route("toggle", &json!({ "component": "centre" })).unwrap().path,
            "/toggle/centre"
        );
        assert_eq!(route("get_status", &Value::Null).unwrap().path, "/status");
    }

    #[test]
    fn other_commands_are_posted() {
        let req = route("start_cleaning", &json!({ "mode": "spot" })).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "/commands/start_cleaning");
        assert_eq!(req.body, Some(json!({ "mode": "spot" })));

        let bare = route("dock", &Value::Null).unwrap();
        assert_eq!(bare.body, Some(json!({})));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            route("move", &json!({ "direction": "up" })),
            Err(CoreError::InvalidCommand { .. })
        ));
        assert!(route("move", &json!({})).is_err());
        assert!(route("toggle", &json!({ "component": "mop" })).is_err());
        assert!(route("dock", &json!([1, 2])).is_err());
        assert!(route("../etc", &Value::Null).is_err());
    }
}
