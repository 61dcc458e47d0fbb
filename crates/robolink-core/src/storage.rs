// ── Key-value persistence seam ──
//
// Device state and cleaning history are persisted through an opaque
// key-value store. The core ships an in-memory implementation; hosts
// provide durable ones.

use bytes::Bytes;
use dashmap::DashMap;

use crate::error::CoreError;

/// Storage key of the persisted `DeviceState` snapshot.
pub const STATE_KEY: &str = "robot_state";

/// Storage key of the cleaning history list.
pub const HISTORY_KEY: &str = "cleaning_history";

/// Opaque key-value persistence.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CoreError>;
    fn set(&self, key: &str, value: Bytes) -> Result<(), CoreError>;
    fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), CoreError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get(STATE_KEY).unwrap().is_none());

        store.set(STATE_KEY, Bytes::from_static(b"{}")).unwrap();
        assert_eq!(store.get(STATE_KEY).unwrap().as_deref(), Some(&b"{}"[..]));
        assert_eq!(store.len(), 1);

        store.remove(STATE_KEY).unwrap();
        assert!(store.is_empty());
    }
}
