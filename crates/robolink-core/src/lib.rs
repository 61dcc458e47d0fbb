// robolink-core: state synchronization between robolink-api and hosts (CLI).

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod model;
pub mod notify;
pub mod router;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{DropReason, DroppedCommand, QueuedCommand};
pub use config::SyncConfig;
pub use dispatcher::{Dispatcher, DispatcherConfig, FlushReport, SendOutcome};
pub use error::CoreError;
pub use history::CleaningHistory;
pub use notify::{Notification, NotificationKind, NotificationSink, TracingSink};
pub use router::{Router, RouterOptions};
pub use scheduler::{Lifecycle, PollConfig, PollScheduler};
pub use storage::{KeyValueStore, MemoryStore};
pub use store::{StateChange, StateStore, StateStream};
pub use transport::{ChannelLink, CommandTransport};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    ActiveTask, Battery, Connectivity, DeviceState, HistoryEntry, OperatingStatus, Position,
    Source, StatePatch, TaskProgress, Update,
};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
