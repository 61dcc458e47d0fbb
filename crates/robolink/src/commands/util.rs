//! Shared helpers for command handlers.

use std::fmt::Write;

use owo_colors::OwoColorize;

use robolink_core::{DeviceState, OperatingStatus};

/// Multi-line detail view of the robot's state.
pub fn format_state(state: &DeviceState, color: bool) -> String {
    let mut out = String::new();
    let name = state.name.as_deref().unwrap_or("-");
    let _ = writeln!(out, "Robot      {} ({name})", state.id);
    let _ = writeln!(out, "Status     {}", paint_status(state.status, color));

    let charging = if state.battery.is_charging {
        " (charging)"
    } else {
        ""
    };
    let _ = writeln!(out, "Battery    {}%{charging}", state.battery.percentage);

    let online = if state.connectivity.is_online {
        "online"
    } else {
        "offline"
    };
    let _ = write!(out, "Link       {online}");
    if let Some(signal) = state.connectivity.signal_strength {
        let _ = write!(out, ", signal {signal} dBm");
    }
    if let Some(seen) = state.connectivity.last_seen {
        let _ = write!(out, ", last seen {}", seen.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    let _ = writeln!(out);

    let p = state.position;
    let _ = writeln!(out, "Position   x={:.2} y={:.2} heading={:.0}°", p.x, p.y, p.rotation);

    match &state.task {
        Some(task) => {
            let _ = write!(
                out,
                "Task       {} {:.0}% ({:.1} m²)",
                task.mode, task.progress.percentage, task.progress.area_covered
            );
            if let Some(zone) = &task.progress.current_zone {
                let _ = write!(out, " in {zone}");
            }
            if let Some(minutes) = task.estimated_duration {
                let _ = write!(out, ", ~{minutes} min");
            }
            let _ = writeln!(out);
        }
        None => {
            let _ = writeln!(out, "Task       -");
        }
    }

    if let Some(error) = &state.last_error {
        let _ = writeln!(out, "Error      {error}");
    }
    out
}

/// One-line summary for streaming output.
pub fn summarize_state(state: &DeviceState, color: bool) -> String {
    let mut line = format!(
        "{} battery={}%",
        paint_status(state.status, color),
        state.battery.percentage
    );
    if let Some(task) = &state.task {
        let _ = write!(line, " progress={:.0}%", task.progress.percentage);
    }
    if !state.connectivity.is_online {
        line.push_str(" offline");
    }
    line
}

fn paint_status(status: OperatingStatus, color: bool) -> String {
    if !color {
        return status.to_string();
    }
    match status {
        OperatingStatus::Cleaning => status.green().to_string(),
        OperatingStatus::Paused | OperatingStatus::Returning => status.yellow().to_string(),
        OperatingStatus::Docked => status.cyan().to_string(),
        OperatingStatus::Error => status.red().bold().to_string(),
        OperatingStatus::Idle => status.dimmed().to_string(),
    }
}
