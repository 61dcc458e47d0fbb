// ── Update router ──
//
// Composition root. Wires the realtime channel, the poll scheduler and the
// local transport into one update queue drained by a single merge task,
// and turns state transitions, connectivity flips and dropped commands
// into notifications.

mod alerts;
mod translate;

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use robolink_api::{Channel, ChannelEvent, SubscriptionToken, Topic};

use crate::command::DroppedCommand;
use crate::config::SyncConfig;
use crate::dispatcher::{Dispatcher, SendOutcome};
use crate::error::CoreError;
use crate::history::CleaningHistory;
use crate::lock;
use crate::model::{
    ConnectivityDelta, DeviceState, HistoryEntry, Source, SourcedUpdate, StatePatch, Update,
};
use crate::notify::{NotificationKind, NotificationSink};
use crate::scheduler::{Lifecycle, PollConfig, PollScheduler};
use crate::storage::KeyValueStore;
use crate::store::{StateStore, StateStream};

pub use alerts::{AlertPolicy, DEFAULT_LOW_BATTERY_THRESHOLD};
pub use translate::translate;

// ── RouterOptions ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub poll: PollConfig,
    pub low_battery_threshold: u8,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            low_battery_threshold: DEFAULT_LOW_BATTERY_THRESHOLD,
        }
    }
}

// ── Router ───────────────────────────────────────────────────────────

/// Owns every component of one device session.
///
/// Cheaply cloneable. Built idle: call [`start()`](Self::start) to spawn
/// the background tasks and open the channel, and
/// [`shutdown()`](Self::shutdown) to tear everything down. A router is
/// started at most once.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    channel: Channel,
    dispatcher: Dispatcher,
    scheduler: PollScheduler,
    store: StateStore,
    history: CleaningHistory,
    sink: Arc<dyn NotificationSink>,
    alerts: Mutex<AlertPolicy>,
    updates_tx: mpsc::UnboundedSender<SourcedUpdate>,
    updates_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<SourcedUpdate>>>,
    handler_tokens: Mutex<Vec<SubscriptionToken>>,
    cancel: CancellationToken,
    task_handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl Router {
    pub fn new(
        channel: Channel,
        dispatcher: Dispatcher,
        store: StateStore,
        sink: Arc<dyn NotificationSink>,
        options: RouterOptions,
    ) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let scheduler = PollScheduler::new(
            dispatcher.clone(),
            Arc::new(channel.clone()),
            options.poll,
            updates_tx.clone(),
        );
        let history = CleaningHistory::new(Arc::clone(store.storage()));

        Self {
            inner: Arc::new(RouterInner {
                channel,
                dispatcher,
                scheduler,
                store,
                history,
                sink,
                alerts: Mutex::new(AlertPolicy::new(options.low_battery_threshold)),
                updates_tx,
                updates_rx: tokio::sync::Mutex::new(Some(updates_rx)),
                handler_tokens: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
                task_handles: tokio::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build the production stack: WebSocket channel, HTTP dispatcher and a
    /// state store loaded from `storage`.
    pub fn from_config(
        config: &SyncConfig,
        storage: Arc<dyn KeyValueStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, CoreError> {
        let client = config.device_client()?;
        let dispatcher = Dispatcher::new(Arc::new(client), config.dispatcher_config());
        let channel = Channel::new(config.channel_config());
        let store = StateStore::load(storage);
        let options = RouterOptions {
            poll: config.poll_config(),
            low_battery_threshold: config.low_battery_threshold,
        };
        Ok(Self::new(channel, dispatcher, store, sink, options))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the merge, connectivity and notice tasks, subscribe to device
    /// events, start polling and open the channel.
    ///
    /// A channel that fails to open is not an error: it keeps retrying on
    /// its own, and the state is fetched once over HTTP in the meantime.
    pub async fn start(&self) -> Result<(), CoreError> {
        let Some(updates_rx) = self.inner.updates_rx.lock().await.take() else {
            return Err(CoreError::Internal("router already started".into()));
        };

        {
            let mut handles = self.inner.task_handles.lock().await;
            let cancel = &self.inner.cancel;

            handles.push(tokio::spawn(merge_task(
                self.clone(),
                updates_rx,
                cancel.child_token(),
            )));
            handles.push(tokio::spawn(connectivity_task(
                self.clone(),
                self.inner.dispatcher.online(),
                cancel.child_token(),
            )));
            handles.push(tokio::spawn(notice_task(
                self.clone(),
                self.inner.dispatcher.notices(),
                cancel.child_token(),
            )));
        }

        self.register_handlers();
        for topic in &Topic::DEVICE_EVENTS {
            self.inner.channel.subscribe(topic);
        }
        self.inner.scheduler.start();

        if let Err(e) = self.inner.channel.connect().await {
            warn!(error = %e, "realtime channel unavailable, polling until it opens");
            if let Err(e) = self.refresh().await {
                debug!(error = %e, "initial state fetch failed");
            }
        }

        info!(url = %self.inner.channel.config().url, "router started");
        Ok(())
    }

    /// Stop polling, close the channel and join the background tasks.
    /// Updates still in flight are dropped.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.scheduler.stop();

        for token in lock(&self.inner.handler_tokens).drain(..) {
            self.inner.channel.off(token);
        }
        self.inner.channel.disconnect();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("router shut down");
    }

    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.inner.scheduler.set_lifecycle(lifecycle);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.scheduler.lifecycle()
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// Hand an update to the merge task. Returns `false` once the router
    /// has shut down.
    pub fn ingest(&self, update: Update, source: Source) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        self.inner
            .updates_tx
            .send(SourcedUpdate::new(source, update))
            .is_ok()
    }

    pub async fn send_command(&self, name: &str, params: Value) -> Result<SendOutcome, CoreError> {
        self.inner.dispatcher.send_command(name, params).await
    }

    /// Fetch the full state over HTTP and feed it to the merge task.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let data = self.inner.dispatcher.fetch_state().await?;
        let patch: StatePatch = serde_json::from_value(data)?;
        self.ingest(Update::FullState(Box::new(patch)), Source::Poll);
        Ok(())
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> Arc<DeviceState> {
        self.inner.store.snapshot()
    }

    pub fn stream(&self) -> StateStream {
        self.inner.store.stream()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.entries()
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    // ── Internals ────────────────────────────────────────────────────

    fn register_handlers(&self) {
        let channel = &self.inner.channel;
        let mut tokens = Vec::with_capacity(Topic::DEVICE_EVENTS.len() + 3);

        for topic in Topic::DEVICE_EVENTS {
            let updates_tx = self.inner.updates_tx.clone();
            tokens.push(channel.on(topic, move |event| forward_event(&updates_tx, event)));
        }

        let dispatcher = self.inner.dispatcher.clone();
        let cancel = self.inner.cancel.clone();
        tokens.push(channel.on(Topic::Connected, move |_| {
            if cancel.is_cancelled() {
                return;
            }
            let dispatcher = dispatcher.clone();
            let cancel = cancel.child_token();
            // Cancelled with the router, so no check or flush outlives shutdown.
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => debug!("connection check abandoned on shutdown"),
                    _ = dispatcher.check_connection() => {}
                }
            });
        }));
        tokens.push(channel.on(Topic::Disconnected, |event| {
            if let ChannelEvent::Disconnected { reason } = event {
                debug!(?reason, "channel closed, polling covers the gap");
            }
        }));
        tokens.push(channel.on(Topic::MaxReconnectAttemptsReached, |event| {
            if let ChannelEvent::MaxReconnectAttemptsReached { attempts } = event {
                warn!(attempts, "channel gave up reconnecting, polling only");
            }
        }));

        lock(&self.inner.handler_tokens).extend(tokens);
    }

    fn merge(&self, source: Source, update: &Update) {
        trace!(%source, kind = update.kind(), "applying update");
        let change = self.inner.store.apply(update);
        if change.changed() {
            self.on_change(&change.previous, &change.current);
        }
    }

    fn on_change(&self, previous: &DeviceState, current: &DeviceState) {
        let alerts = lock(&self.inner.alerts).evaluate(previous, current);
        for alert in alerts {
            self.notify(alert.kind, &alert.title, &alert.message);
        }

        if let (Some(task), None) = (&previous.task, &current.task) {
            let entry = HistoryEntry::from_task(task, current.status, Utc::now());
            if let Err(e) = self.inner.history.record(entry) {
                warn!(error = %e, "failed to record cleaning history");
            }
        }
    }

    fn on_connectivity(&self, online: bool) {
        let delta = ConnectivityDelta {
            is_online: Some(online),
            signal_strength: None,
            last_seen: online.then(Utc::now),
        };
        self.ingest(Update::Connectivity(delta), Source::Probe);

        if online {
            self.notify(
                NotificationKind::Success,
                "Connection restored",
                "Robot is reachable again",
            );
        } else {
            self.notify(
                NotificationKind::Warning,
                "Connection lost",
                "Commands will be queued until the robot is reachable",
            );
        }
    }

    fn on_dropped(&self, notice: &DroppedCommand) {
        let message = format!("'{}' was discarded ({})", notice.command.name, notice.reason);
        self.notify(NotificationKind::Error, "Command dropped", &message);
    }

    fn notify(&self, kind: NotificationKind, title: &str, message: &str) {
        self.inner.sink.notify(kind, title, message);
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("channel_connected", &self.inner.channel.is_connected())
            .field("dispatcher", &self.inner.dispatcher)
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}

/// Channel handler body: translate and queue for the merge task.
fn forward_event(updates_tx: &mpsc::UnboundedSender<SourcedUpdate>, event: &ChannelEvent) {
    let Some(message) = event.as_message() else {
        return;
    };
    match translate(message) {
        Ok(updates) => {
            for update in updates {
                let _ = updates_tx.send(SourcedUpdate::new(Source::Channel, update));
            }
        }
        Err(e) => debug!(kind = %message.kind, error = %e, "dropping untranslatable event"),
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Single consumer of all updates; the only caller of `StateStore::apply`
/// while the router runs.
async fn merge_task(
    router: Router,
    mut updates_rx: mpsc::UnboundedReceiver<SourcedUpdate>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = updates_rx.recv() => {
                let Some(SourcedUpdate { source, update }) = next else {
                    break;
                };
                router.merge(source, &update);
            }
        }
    }
}

/// Mirror dispatcher connectivity flips into state and notifications.
async fn connectivity_task(
    router: Router,
    mut online: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    online.borrow_and_update();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *online.borrow_and_update();
                router.on_connectivity(value);
            }
        }
    }
}

async fn notice_task(
    router: Router,
    mut notices: broadcast::Receiver<DroppedCommand>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = notices.recv() => match result {
                Ok(notice) => router.on_dropped(&notice),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "dropped-command notices lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
