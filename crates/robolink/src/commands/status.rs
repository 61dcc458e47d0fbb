//! `robolink status`: one HTTP fetch, merged into the persisted state.

use chrono::Utc;

use robolink_core::model::ConnectivityDelta;
use robolink_core::{CoreError, StatePatch, StateStore, Update};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::{Session, util};

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let dispatcher = session.dispatcher()?;
    let store = StateStore::load(session.storage()?);

    let data = dispatcher.fetch_state().await?;
    let patch: StatePatch = serde_json::from_value(data).map_err(CoreError::from)?;
    store.apply(&Update::FullState(Box::new(patch)));
    store.apply(&Update::Connectivity(ConnectivityDelta {
        is_online: Some(true),
        last_seen: Some(Utc::now()),
        ..ConnectivityDelta::default()
    }));

    let color = output::should_color(global.color);
    let state = store.snapshot();
    let out = output::render_single(global.output, state.as_ref(), |s| {
        util::format_state(s, color)
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
