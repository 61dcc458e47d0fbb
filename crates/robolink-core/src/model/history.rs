use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActiveTask, OperatingStatus};

/// A finished cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    /// Final progress, 0.0..=100.0.
    pub progress: f64,
    pub area_covered: f64,
    /// Device status when the run ended.
    pub final_status: OperatingStatus,
}

impl HistoryEntry {
    pub fn from_task(task: &ActiveTask, final_status: OperatingStatus, ended_at: DateTime<Utc>) -> Self {
        Self {
            mode: task.mode.clone(),
            started_at: task.started_at,
            ended_at,
            progress: task.progress.percentage,
            area_covered: task.progress.area_covered,
            final_status,
        }
    }
}
