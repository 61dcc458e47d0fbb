//! `robolink history`: finished cleaning runs from the local store.

use tabled::Tabled;

use robolink_core::{CleaningHistory, HistoryEntry};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::Session;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Ended")]
    ended: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Area")]
    area: String,
}

impl From<&HistoryEntry> for HistoryRow {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            ended: entry.ended_at.format("%Y-%m-%d %H:%M").to_string(),
            mode: entry.mode.clone(),
            result: entry.final_status.to_string(),
            progress: format!("{:.0}%", entry.progress),
            area: format!("{:.1} m²", entry.area_covered),
        }
    }
}

pub fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let entries = CleaningHistory::new(session.storage()?).entries();
    let out = output::render_list(global.output, &entries, |e| HistoryRow::from(e))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
