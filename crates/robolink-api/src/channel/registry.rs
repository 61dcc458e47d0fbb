// ── Topic → handler registry ──
//
// Handlers are stored per topic in insertion order and addressed by an
// opaque token, so removal never depends on comparing closures.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::message::{ChannelEvent, Topic};

/// Callback invoked for every event on a topic.
pub type Handler = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by [`Channel::on`](super::Channel::on); pass it to
/// [`Channel::off`](super::Channel::off) to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    by_topic: HashMap<Topic, IndexMap<u64, Handler>>,
    topic_of: HashMap<u64, Topic>,
}

impl HandlerRegistry {
    pub(crate) fn register(&mut self, topic: Topic, handler: Handler) -> SubscriptionToken {
        self.next_id += 1;
        let id = self.next_id;
        self.by_topic
            .entry(topic.clone())
            .or_default()
            .insert(id, handler);
        self.topic_of.insert(id, topic);
        SubscriptionToken(id)
    }

    /// Remove a handler. Returns `false` if the token was already removed.
    pub(crate) fn remove(&mut self, token: SubscriptionToken) -> bool {
        let Some(topic) = self.topic_of.remove(&token.0) else {
            return false;
        };
        let Some(handlers) = self.by_topic.get_mut(&topic) else {
            return false;
        };
        let removed = handlers.shift_remove(&token.0).is_some();
        if handlers.is_empty() {
            self.by_topic.remove(&topic);
        }
        removed
    }

    /// Handlers for a topic, in registration order.
    pub(crate) fn handlers_for(&self, topic: &Topic) -> Vec<Handler> {
        self.by_topic
            .get(topic)
            .map(|handlers| handlers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, topic: &Topic) -> usize {
        self.by_topic.get(topic).map_or(0, IndexMap::len)
    }
}
