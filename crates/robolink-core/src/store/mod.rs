// ── State store ──
//
// Owns the single live `DeviceState`. Every mutation goes through
// `StateStore::apply`, which reduces under a mutex, publishes the new
// snapshot, persists it and then calls listeners with (previous, current).
// Whole applies are serialized by a commit lock, so storage and listeners
// observe changes in the order they were made.

mod reducer;
mod stream;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use indexmap::IndexMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::lock;
use crate::model::{DeviceState, Update};
use crate::storage::{KeyValueStore, STATE_KEY};

pub use reducer::reduce;
pub use stream::{StateStream, StateWatchStream};

/// Callback invoked after each state change with `(previous, current)`.
pub type StateListener = Arc<dyn Fn(&DeviceState, &DeviceState) + Send + Sync>;

/// Token returned by [`StateStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// Result of a single [`StateStore::apply`].
#[derive(Debug, Clone)]
pub struct StateChange {
    pub previous: Arc<DeviceState>,
    pub current: Arc<DeviceState>,
}

impl StateChange {
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(&self.previous, &self.current)
    }
}

/// The authoritative device state. Cheaply cloneable.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    /// Held for a whole `apply`: reduce, persist and listener calls.
    commit: Mutex<()>,
    state: Mutex<Arc<DeviceState>>,
    snapshot_tx: watch::Sender<Arc<DeviceState>>,
    storage: Arc<dyn KeyValueStore>,
    listeners: Mutex<IndexMap<u64, StateListener>>,
    next_listener: AtomicU64,
}

impl StateStore {
    /// Load the persisted snapshot, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let initial = match storage.get(STATE_KEY) {
            Ok(Some(bytes)) => serde_json::from_slice::<DeviceState>(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "persisted state unreadable, starting from defaults");
                DeviceState::default()
            }),
            Ok(None) => DeviceState::default(),
            Err(e) => {
                warn!(error = %e, "failed to read persisted state");
                DeviceState::default()
            }
        };
        Self::with_state(initial, storage)
    }

    pub fn with_state(initial: DeviceState, storage: Arc<dyn KeyValueStore>) -> Self {
        let initial = Arc::new(initial);
        let (snapshot_tx, _) = watch::channel(Arc::clone(&initial));
        Self {
            inner: Arc::new(StoreInner {
                commit: Mutex::new(()),
                state: Mutex::new(initial),
                snapshot_tx,
                storage,
                listeners: Mutex::new(IndexMap::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<DeviceState> {
        Arc::clone(&lock(&self.inner.state))
    }

    /// Reduce `update` into the state.
    ///
    /// An update that changes nothing is neither published nor persisted,
    /// and listeners are not called.
    pub fn apply(&self, update: &Update) -> StateChange {
        let _commit = lock(&self.inner.commit);
        let change = {
            let mut state = lock(&self.inner.state);
            let previous = Arc::clone(&state);
            let next = reducer::reduce(&previous, update);
            if next == *previous {
                return StateChange {
                    current: Arc::clone(&previous),
                    previous,
                };
            }
            let current = Arc::new(next);
            *state = Arc::clone(&current);
            self.inner.snapshot_tx.send_replace(Arc::clone(&current));
            StateChange { previous, current }
        };

        let (from, to) = (change.previous.status, change.current.status);
        if !from.expects_transition_to(to) {
            debug!(%from, %to, "unexpected status transition, applying anyway");
        }

        self.persist(&change.current);

        let listeners: Vec<StateListener> = lock(&self.inner.listeners).values().cloned().collect();
        for listener in listeners {
            listener(&change.previous, &change.current);
        }
        change
    }

    /// Register a change listener. Listeners run synchronously on the
    /// applying task, may read [`snapshot`](Self::snapshot), and must not
    /// call [`apply`](Self::apply).
    pub fn subscribe<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn(&DeviceState, &DeviceState) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).insert(id, Arc::new(listener));
        ListenerToken(id)
    }

    pub fn unsubscribe(&self, token: ListenerToken) -> bool {
        lock(&self.inner.listeners).shift_remove(&token.0).is_some()
    }

    /// Async subscription to snapshots.
    pub fn stream(&self) -> StateStream {
        StateStream::new(self.inner.snapshot_tx.subscribe())
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.storage
    }

    fn persist(&self, state: &DeviceState) {
        let bytes = match serde_json::to_vec(state) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                warn!(error = %e, "failed to encode state for persistence");
                return;
            }
        };
        if let Err(e) = self.inner.storage.set(STATE_KEY, bytes) {
            warn!(error = %e, "failed to persist state");
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{BatteryDelta, OperatingStatus};
    use crate::storage::MemoryStore;

    fn battery(percentage: f64) -> Update {
        Update::Battery(BatteryDelta {
            percentage: Some(percentage),
            ..BatteryDelta::default()
        })
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(STATE_KEY, Bytes::from_static(b"not json")).unwrap();
        let store = StateStore::load(storage);
        assert_eq!(*store.snapshot(), DeviceState::default());
    }

    #[test]
    fn apply_persists_and_reloads() {
        let storage = Arc::new(MemoryStore::new());
        let store = StateStore::load(storage.clone());
        store.apply(&Update::status(OperatingStatus::Cleaning));
        store.apply(&battery(64.0));

        let reloaded = StateStore::load(storage);
        assert_eq!(reloaded.snapshot().status, OperatingStatus::Cleaning);
        assert_eq!(reloaded.snapshot().battery.percentage, 64);
    }

    #[test]
    fn listeners_see_previous_and_current() {
        let store = StateStore::load(Arc::new(MemoryStore::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = {
            let seen = Arc::clone(&seen);
            store.subscribe(move |prev, cur| {
                lock(&seen).push((prev.battery.percentage, cur.battery.percentage));
            })
        };

        store.apply(&battery(90.0));
        store.apply(&battery(80.0));
        assert!(store.unsubscribe(token));
        store.apply(&battery(70.0));

        assert_eq!(*lock(&seen), vec![(100, 90), (90, 80)]);
    }

    #[test]
    fn no_op_update_is_silent() {
        let storage = Arc::new(MemoryStore::new());
        let store = StateStore::load(storage.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            store.subscribe(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        let change = store.apply(&battery(100.0));
        assert!(!change.changed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn unexpected_transition_is_still_applied() {
        let store = StateStore::load(Arc::new(MemoryStore::new()));
        let change = store.apply(&Update::status(OperatingStatus::Docked));
        assert!(change.changed());
        assert_eq!(store.snapshot().status, OperatingStatus::Docked);
    }

    /// Sleeps on its first write so a later apply can overtake it.
    struct SlowFirstWrite {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl KeyValueStore for SlowFirstWrite {
        fn get(&self, key: &str) -> Result<Option<Bytes>, crate::CoreError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Bytes) -> Result<(), crate::CoreError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(std::time::Duration::from_millis(300));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), crate::CoreError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn concurrent_applies_persist_and_notify_in_commit_order() {
        let storage = Arc::new(SlowFirstWrite {
            inner: MemoryStore::new(),
            writes: AtomicUsize::new(0),
        });
        let store = StateStore::load(storage.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            store.subscribe(move |prev, cur| {
                lock(&seen).push((prev.battery.percentage, cur.battery.percentage));
            });
        }

        let first = {
            let store = store.clone();
            std::thread::spawn(move || store.apply(&battery(50.0)))
        };
        // Let the first apply reach its slow write.
        std::thread::sleep(std::time::Duration::from_millis(50));
        store.apply(&battery(40.0));
        first.join().unwrap();

        let live = store.snapshot().battery.percentage;
        let persisted = StateStore::load(storage).snapshot().battery.percentage;
        assert_eq!(live, 40);
        assert_eq!(persisted, live);
        assert_eq!(*lock(&seen), vec![(100, 50), (50, 40)]);
    }

    #[tokio::test]
    async fn stream_observes_changes() {
        let store = StateStore::load(Arc::new(MemoryStore::new()));
        let mut stream = store.stream();
        assert_eq!(stream.current().battery.percentage, 100);

        store.apply(&battery(50.0));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.battery.percentage, 50);
        assert_eq!(stream.latest().battery.percentage, 50);
    }
}
