// ── Reducer ──
//
// `reduce` is the only function that produces a new `DeviceState`. Nested
// objects are shallow-merged field by field; a field absent from the
// update is never reset.

use crate::model::{
    ActiveTask, Battery, BatteryDelta, Connectivity, ConnectivityDelta, DeviceState, Position,
    PositionDelta, ProgressDelta, StatePatch, TaskPatch, TaskProgress, Update,
};

/// Apply `update` to `state`, returning the next state.
pub fn reduce(state: &DeviceState, update: &Update) -> DeviceState {
    let mut next = state.clone();
    match update {
        Update::Status { status, error } => {
            next.status = *status;
            if let Some(error) = error {
                next.last_error = Some(error.clone());
            }
        }
        Update::Battery(delta) => merge_battery(&mut next.battery, delta),
        Update::Position(delta) => merge_position(&mut next.position, delta),
        Update::Connectivity(delta) => merge_connectivity(&mut next.connectivity, delta),
        Update::TaskProgress(delta) => {
            let task = next.task.get_or_insert_with(ActiveTask::default);
            merge_progress(&mut task.progress, delta);
        }
        Update::TaskDuration { estimated_duration } => {
            let task = next.task.get_or_insert_with(ActiveTask::default);
            task.estimated_duration = Some(*estimated_duration);
        }
        Update::Capabilities(flags) => {
            next.capabilities
                .extend(flags.iter().map(|(name, on)| (name.clone(), *on)));
        }
        Update::FullState(patch) => merge_full(&mut next, patch),
    }
    next
}

fn merge_full(state: &mut DeviceState, patch: &StatePatch) {
    if let Some(id) = &patch.id {
        state.id.clone_from(id);
    }
    if let Some(name) = &patch.name {
        state.name = Some(name.clone());
    }
    if let Some(status) = patch.status {
        state.status = status;
    }
    if let Some(error) = &patch.last_error {
        state.last_error = Some(error.clone());
    }
    if let Some(battery) = &patch.battery {
        merge_battery(&mut state.battery, battery);
    }
    if let Some(connectivity) = &patch.connectivity {
        merge_connectivity(&mut state.connectivity, connectivity);
    }
    if let Some(position) = &patch.position {
        merge_position(&mut state.position, position);
    }
    match &patch.task {
        None => {}
        Some(None) => state.task = None,
        Some(Some(task)) => merge_task(state.task.get_or_insert_with(ActiveTask::default), task),
    }
    if let Some(flags) = &patch.capabilities {
        state
            .capabilities
            .extend(flags.iter().map(|(name, on)| (name.clone(), *on)));
    }
}

fn merge_battery(battery: &mut Battery, delta: &BatteryDelta) {
    if let Some(percentage) = delta.percentage {
        battery.percentage = clamp_percent(percentage);
    }
    if let Some(charging) = delta.is_charging {
        battery.is_charging = charging;
    }
    if let Some(runtime) = delta.estimated_runtime {
        battery.estimated_runtime = Some(runtime);
    }
}

fn merge_connectivity(connectivity: &mut Connectivity, delta: &ConnectivityDelta) {
    if let Some(online) = delta.is_online {
        connectivity.is_online = online;
    }
    if let Some(signal) = delta.signal_strength {
        connectivity.signal_strength = Some(signal);
    }
    if let Some(seen) = delta.last_seen {
        connectivity.last_seen = Some(seen);
    }
}

fn merge_position(position: &mut Position, delta: &PositionDelta) {
    if let Some(x) = delta.x {
        position.x = x;
    }
    if let Some(y) = delta.y {
        position.y = y;
    }
    if let Some(rotation) = delta.rotation {
        position.rotation = rotation;
    }
}

fn merge_progress(progress: &mut TaskProgress, delta: &ProgressDelta) {
    if let Some(percentage) = delta.percentage {
        progress.percentage = percentage.clamp(0.0, 100.0);
    }
    if let Some(area) = delta.area_covered {
        progress.area_covered = area.max(0.0);
    }
    if let Some(zone) = &delta.current_zone {
        progress.current_zone = Some(zone.clone());
    }
}

fn merge_task(task: &mut ActiveTask, patch: &TaskPatch) {
    if let Some(mode) = &patch.mode {
        task.mode.clone_from(mode);
    }
    if let Some(started) = patch.started_at {
        task.started_at = Some(started);
    }
    if let Some(duration) = patch.estimated_duration {
        task.estimated_duration = Some(duration);
    }
    if let Some(progress) = &patch.progress {
        merge_progress(&mut task.progress, progress);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::OperatingStatus;

    fn battery(percentage: Option<f64>, charging: Option<bool>) -> Update {
        Update::Battery(BatteryDelta {
            percentage,
            is_charging: charging,
            estimated_runtime: None,
        })
    }

    #[test]
    fn status_update_sets_status_and_error() {
        let state = DeviceState {
            status: OperatingStatus::Cleaning,
            ..DeviceState::default()
        };
        let next = reduce(&state, &Update::status(OperatingStatus::Docked));
        assert_eq!(next.status, OperatingStatus::Docked);
        assert_eq!(next.last_error, None);

        let failed = reduce(
            &next,
            &Update::Status {
                status: OperatingStatus::Error,
                error: Some("cliff sensor".into()),
            },
        );
        assert_eq!(failed.status, OperatingStatus::Error);
        assert_eq!(failed.last_error.as_deref(), Some("cliff sensor"));
    }

    #[test]
    fn partial_battery_delta_keeps_other_fields() {
        let state = reduce(&DeviceState::default(), &battery(Some(80.0), Some(true)));
        let next = reduce(&state, &battery(Some(79.0), None));
        assert_eq!(next.battery.percentage, 79);
        assert!(next.battery.is_charging);
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(reduce(&DeviceState::default(), &battery(Some(140.0), None)).battery.percentage, 100);
        assert_eq!(reduce(&DeviceState::default(), &battery(Some(-3.0), None)).battery.percentage, 0);
        assert_eq!(reduce(&DeviceState::default(), &battery(Some(41.6), None)).battery.percentage, 42);
    }

    #[test]
    fn replaying_an_update_is_idempotent() {
        let update = Update::Position(PositionDelta {
            x: Some(1.5),
            y: None,
            rotation: Some(90.0),
        });
        let once = reduce(&DeviceState::default(), &update);
        let twice = reduce(&once, &update);
        assert_eq!(once, twice);
    }

    #[test]
    fn progress_delta_starts_a_task() {
        let next = reduce(
            &DeviceState::default(),
            &Update::TaskProgress(ProgressDelta {
                percentage: Some(12.5),
                area_covered: Some(4.0),
                current_zone: Some("kitchen".into()),
            }),
        );
        let task = next.task.unwrap_or_default();
        assert_eq!(task.progress.percentage, 12.5);
        assert_eq!(task.progress.current_zone.as_deref(), Some("kitchen"));
    }

    #[test]
    fn full_state_merges_nested_objects_shallowly() {
        let mut state = DeviceState::default();
        state.connectivity.signal_strength = Some(-50);
        state.position.x = 3.0;

        let patch = StatePatch {
            status: Some(OperatingStatus::Cleaning),
            connectivity: Some(ConnectivityDelta {
                is_online: Some(true),
                ..ConnectivityDelta::default()
            }),
            position: Some(PositionDelta {
                y: Some(2.0),
                ..PositionDelta::default()
            }),
            capabilities: Some(BTreeMap::from([("mop".to_owned(), true)])),
            ..StatePatch::default()
        };
        let next = reduce(&state, &Update::FullState(Box::new(patch)));

        assert_eq!(next.status, OperatingStatus::Cleaning);
        assert!(next.connectivity.is_online);
        assert_eq!(next.connectivity.signal_strength, Some(-50));
        assert_eq!(next.position.x, 3.0);
        assert_eq!(next.position.y, 2.0);
        assert_eq!(next.capabilities.get("mop"), Some(&true));
    }

    #[test]
    fn task_cleared_only_by_explicit_null() {
        let state = reduce(
            &DeviceState::default(),
            &Update::TaskDuration {
                estimated_duration: 45,
            },
        );
        assert!(state.task.is_some());

        let kept = reduce(&state, &Update::FullState(Box::default()));
        assert!(kept.task.is_some());

        let cleared = reduce(
            &state,
            &Update::FullState(Box::new(StatePatch {
                task: Some(None),
                ..StatePatch::default()
            })),
        );
        assert!(cleared.task.is_none());
    }

    #[test]
    fn capabilities_merge_instead_of_replace() {
        let first = reduce(
            &DeviceState::default(),
            &Update::Capabilities(BTreeMap::from([("vacuum".to_owned(), true)])),
        );
        let second = reduce(
            &first,
            &Update::Capabilities(BTreeMap::from([("pump".to_owned(), false)])),
        );
        assert_eq!(second.capabilities.len(), 2);
        assert_eq!(second.capabilities.get("vacuum"), Some(&true));
    }
}
