// ── Cleaning history ──
//
// Finished runs, newest last, persisted as one JSON list under
// `cleaning_history` and trimmed to the most recent entries.

use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::error::CoreError;
use crate::model::HistoryEntry;
use crate::storage::{HISTORY_KEY, KeyValueStore};

pub const HISTORY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct CleaningHistory {
    storage: Arc<dyn KeyValueStore>,
    limit: usize,
}

impl CleaningHistory {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            limit: HISTORY_LIMIT,
        }
    }

    /// Stored entries, oldest first. An unreadable list reads as empty.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        match self.storage.get(HISTORY_KEY) {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "cleaning history unreadable, starting over");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read cleaning history");
                Vec::new()
            }
        }
    }

    pub fn record(&self, entry: HistoryEntry) -> Result<(), CoreError> {
        let mut entries = self.entries();
        entries.push(entry);
        let excess = entries.len().saturating_sub(self.limit);
        entries.drain(..excess);

        let bytes = serde_json::to_vec(&entries)?;
        self.storage.set(HISTORY_KEY, Bytes::from(bytes))
    }

    pub fn clear(&self) -> Result<(), CoreError> {
        self.storage.remove(HISTORY_KEY)
    }
}

impl std::fmt::Debug for CleaningHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleaningHistory")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
