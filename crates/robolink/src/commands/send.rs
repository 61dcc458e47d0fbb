//! `robolink send`, `move` and `toggle`: one-shot command delivery.

use serde::Serialize;
use serde_json::{Map, Value, json};

use robolink_core::SendOutcome;

use crate::cli::{Component, Direction, GlobalOpts, SendArgs};
use crate::error::CliError;
use crate::output;

use super::Session;

#[derive(Debug, Serialize)]
struct Delivery<'a> {
    command: &'a str,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

pub async fn handle(session: &Session, args: &SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let params = parse_params(&args.params)?;
    deliver(session, &args.name, params, global).await
}

pub async fn motion(
    session: &Session,
    direction: Direction,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let params = json!({ "direction": direction.as_str() });
    deliver(session, "move", params, global).await
}

pub async fn toggle(
    session: &Session,
    component: Component,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let params = json!({ "component": component.as_str() });
    deliver(session, "toggle", params, global).await
}

/// A one-shot process has nobody to flush its queue later, so a queued
/// outcome is reported as a failure.
async fn deliver(
    session: &Session,
    name: &str,
    params: Value,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let dispatcher = session.dispatcher()?;
    match dispatcher.send_command(name, params).await? {
        SendOutcome::Delivered(envelope) => {
            let delivery = Delivery {
                command: name,
                status: envelope.status,
                message: envelope.message,
                data: envelope.data,
            };
            let out = output::render_single(global.output, &delivery, |d| match &d.message {
                Some(message) => format!("{}: {message}", d.command),
                None => format!("{}: ok", d.command),
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        SendOutcome::Queued(_) => Err(CliError::NotDelivered {
            command: name.to_owned(),
        }),
    }
}

/// `key=value` pairs into a JSON object. Values that parse as JSON keep
/// their type; anything else is a string.
fn parse_params(raw: &[String]) -> Result<Value, CliError> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    let mut params = Map::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Validation {
                field: "param".into(),
                reason: format!("expected KEY=VALUE, got '{pair}'"),
            });
        };
        if key.is_empty() {
            return Err(CliError::Validation {
                field: "param".into(),
                reason: format!("empty key in '{pair}'"),
            });
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
        params.insert(key.to_owned(), value);
    }
    Ok(Value::Object(params))
}
