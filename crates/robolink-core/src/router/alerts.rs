// ── State-derived alerts ──

use crate::model::{DeviceState, OperatingStatus};
use crate::notify::{Notification, NotificationKind};

pub const DEFAULT_LOW_BATTERY_THRESHOLD: u8 = 20;

/// Decides which notifications a state change warrants.
///
/// The low-battery warning is latched: it fires once when the level drops
/// to or below the threshold and re-arms when the level climbs back above
/// it or the device starts charging.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    low_battery_threshold: u8,
    armed: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_BATTERY_THRESHOLD)
    }
}

impl AlertPolicy {
    pub fn new(low_battery_threshold: u8) -> Self {
        Self {
            low_battery_threshold,
            armed: true,
        }
    }

    pub fn low_battery_threshold(&self) -> u8 {
        self.low_battery_threshold
    }

    pub fn evaluate(&mut self, previous: &DeviceState, current: &DeviceState) -> Vec<Notification> {
        let mut out = Vec::new();

        if current.status != previous.status {
            match current.status {
                OperatingStatus::Error => out.push(Notification::new(
                    NotificationKind::Error,
                    "Robot error",
                    current.last_error.as_deref().unwrap_or("Unknown error"),
                )),
                OperatingStatus::Docked => out.push(Notification::new(
                    NotificationKind::Success,
                    "Docked",
                    "Robot returned to its dock",
                )),
                _ => {}
            }
        }

        if current.battery != previous.battery {
            let battery = &current.battery;
            if battery.is_charging || battery.percentage > self.low_battery_threshold {
                self.armed = true;
            } else if self.armed {
                self.armed = false;
                out.push(Notification::new(
                    NotificationKind::Warning,
                    "Low battery",
                    format!("Battery at {}%", battery.percentage),
                ));
            }
        }

        out
    }
}
