//! Reconnecting realtime channel with per-topic handlers.
//!
//! A [`Channel`] owns at most one open socket. Inbound text frames are
//! parsed into [`ChannelMessage`]s and dispatched to handlers registered
//! with [`Channel::on`]; malformed frames are logged and dropped. When the
//! socket closes for any reason other than [`Channel::disconnect`], a
//! reconnect is scheduled with exponential backoff until the configured
//! attempt ceiling is reached.
//!
//! ```rust,ignore
//! use robolink_api::channel::{Channel, ChannelConfig, Topic};
//!
//! let channel = Channel::new(ChannelConfig::new(url));
//! channel.on(Topic::BatteryUpdate, |event| println!("{event:?}"));
//! channel.subscribe(&Topic::BatteryUpdate);
//! channel.connect().await?;
//! ```

mod connector;
mod message;
mod registry;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::schedule::ScheduledTask;

pub use connector::{Connector, FrameSink, FrameStream, Socket, WsConnector};
pub use message::{ChannelEvent, ChannelMessage, Topic};
pub use registry::{Handler, SubscriptionToken};

use registry::HandlerRegistry;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub base_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Reconnection attempts before giving up.
    /// `None` means retry forever. Default: 5.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(5),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(base * 2^(attempt - 1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

// ── ChannelConfig ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub url: Url,
    pub reconnect: ReconnectConfig,
    /// Deadline for a single open attempt.
    pub connect_timeout: Duration,
    /// Keepalive `ping` cadence while open. Zero disables it.
    pub ping_interval: Duration,
}

impl ChannelConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::ZERO,
        }
    }
}

// ── Connection record ────────────────────────────────────────────────

/// Transport state of the channel socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Snapshot of the channel's connection bookkeeping.
///
/// Exists from the first `connect()` until `disconnect()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    pub state: TransportState,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempt: u32,
    /// Topics announced to the remote side.
    pub topics: BTreeSet<String>,
    /// Delay of the reconnect currently waiting to fire, if any.
    pub pending_reconnect: Option<Duration>,
}

// ── Channel ──────────────────────────────────────────────────────────

/// Handle to the realtime channel. Cheap to clone; all clones share one
/// socket and one handler registry.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    /// Bumped on every open attempt and on teardown. Socket tasks and
    /// reconnect timers carry the value they were started with and go
    /// quiet once it moves on.
    generation: AtomicU64,
    record: Mutex<Option<ConnectionRecord>>,
    link: Mutex<Option<Link>>,
    reconnect: Mutex<Option<ScheduledTask>>,
    registry: Mutex<HandlerRegistry>,
    state_tx: watch::Sender<TransportState>,
}

/// The live socket task and its outbound queue.
struct Link {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

enum CloseAction {
    Retry { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    /// Channel backed by the WebSocket connector.
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    pub fn with_connector(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                connector,
                generation: AtomicU64::new(0),
                record: Mutex::new(None),
                link: Mutex::new(None),
                reconnect: Mutex::new(None),
                registry: Mutex::new(HandlerRegistry::default()),
                state_tx,
            }),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the socket. Resolves once it is open; rejects if the attempt
    /// fails or times out. A no-op when already connected.
    ///
    /// A failed attempt emits `error` and then `disconnected`, and the
    /// close path schedules the next reconnect.
    pub async fn connect(&self) -> Result<(), Error> {
        {
            let mut record = lock(&self.inner.record);
            let record = record.get_or_insert_with(ConnectionRecord::default);
            if record.state == TransportState::Connected {
                return Ok(());
            }
        }
        self.cancel_pending_reconnect();
        self.open().await
    }

    /// Tear the socket down, cancel any pending reconnect and drop the
    /// connection record. Handlers stay registered.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_pending_reconnect();

        let was_open = lock(&self.inner.record).as_mut().is_some_and(|record| {
            let was_open = record.state == TransportState::Connected;
            record.state = TransportState::Closing;
            was_open
        });
        if was_open {
            self.inner.state_tx.send_replace(TransportState::Closing);
        }

        if let Some(link) = lock(&self.inner.link).take() {
            link.cancel.cancel();
        }

        *lock(&self.inner.record) = None;
        self.inner
            .state_tx
            .send_replace(TransportState::Disconnected);

        if was_open {
            tracing::info!(url = %self.inner.config.url, "channel disconnected by client");
            self.emit(&ChannelEvent::Disconnected {
                reason: Some("disconnected by client".into()),
            });
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Queue a message on the open socket. Returns `false` without
    /// sending when the channel is not open.
    pub fn send(&self, message: &ChannelMessage) -> bool {
        if !self.is_connected() {
            tracing::debug!(kind = %message.kind, "channel not open, message not sent");
            return false;
        }
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(kind = %message.kind, error = %e, "failed to encode channel message");
                return false;
            }
        };
        lock(&self.inner.link)
            .as_ref()
            .is_some_and(|link| link.outbound.send(frame).is_ok())
    }

    /// Tell the remote side we want `topic`. The topic is remembered and
    /// re-announced after every reconnect. Returns whether a frame was sent.
    pub fn subscribe(&self, topic: &Topic) -> bool {
        lock(&self.inner.record)
            .get_or_insert_with(ConnectionRecord::default)
            .topics
            .insert(topic.as_str().to_owned());
        self.send(&ChannelMessage::subscribe(topic))
    }

    pub fn unsubscribe(&self, topic: &Topic) -> bool {
        if let Some(record) = lock(&self.inner.record).as_mut() {
            record.topics.remove(topic.as_str());
        }
        self.send(&ChannelMessage::unsubscribe(topic))
    }

    // ── Handlers ─────────────────────────────────────────────────────

    /// Register a handler for `topic`. Handlers run on the task that
    /// produced the event and must not block.
    pub fn on<F>(&self, topic: Topic, handler: F) -> SubscriptionToken
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.registry).register(topic, Arc::new(handler))
    }

    /// Remove the handler behind `token`. Returns `false` if it was
    /// already removed.
    pub fn off(&self, token: SubscriptionToken) -> bool {
        lock(&self.inner.registry).remove(token)
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        *self.inner.state_tx.borrow() == TransportState::Connected
    }

    /// Watch receiver of the transport state.
    pub fn state(&self) -> watch::Receiver<TransportState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot of the connection record, `None` before the first
    /// `connect()` and after `disconnect()`.
    pub fn record(&self) -> Option<ConnectionRecord> {
        lock(&self.inner.record).clone()
    }

    // ── Internals ────────────────────────────────────────────────────

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, state: TransportState) {
        if let Some(record) = lock(&self.inner.record).as_mut() {
            record.state = state;
        }
        self.inner.state_tx.send_replace(state);
    }

    fn emit(&self, event: &ChannelEvent) {
        let handlers = lock(&self.inner.registry).handlers_for(&event.topic());
        for handler in handlers {
            handler(event);
        }
    }

    fn cancel_pending_reconnect(&self) {
        if let Some(task) = lock(&self.inner.reconnect).take() {
            task.cancel();
        }
        if let Some(record) = lock(&self.inner.record).as_mut() {
            record.pending_reconnect = None;
        }
    }

    async fn open(&self) -> Result<(), Error> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(TransportState::Connecting);

        let url = &self.inner.config.url;
        let deadline = self.inner.config.connect_timeout;
        tracing::debug!(url = %url, "opening channel");

        let outcome =
            match tokio::time::timeout(deadline, self.inner.connector.connect(url)).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(deadline)),
            };

        if !self.is_current(generation) {
            tracing::debug!("discarding superseded connect attempt");
            return Err(Error::Cancelled);
        }

        match outcome {
            Ok(socket) => {
                self.on_open(generation, socket);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "channel connect failed");
                self.emit(&ChannelEvent::Error {
                    message: e.to_string(),
                });
                self.handle_close(generation, Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn on_open(&self, generation: u64, socket: Socket) {
        let topics = {
            let mut record = lock(&self.inner.record);
            let record = record.get_or_insert_with(ConnectionRecord::default);
            record.state = TransportState::Connected;
            record.reconnect_attempt = 0;
            record.pending_reconnect = None;
            record.topics.clone()
        };

        {
            let (outbound, outbound_rx) = mpsc::unbounded_channel();
            let cancel = CancellationToken::new();
            let mut link = lock(&self.inner.link);
            for topic in &topics {
                match ChannelMessage::subscribe(&Topic::from(topic.as_str())).to_json() {
                    Ok(frame) => {
                        let _ = outbound.send(frame);
                    }
                    Err(e) => tracing::warn!(topic = %topic, error = %e, "failed to encode subscribe"),
                }
            }
            let task = tokio::spawn(run_socket(
                self.clone(),
                generation,
                socket,
                outbound_rx,
                cancel.clone(),
            ));
            *link = Some(Link {
                outbound,
                cancel,
                _task: task,
            });
        }

        self.inner
            .state_tx
            .send_replace(TransportState::Connected);
        tracing::info!(url = %self.inner.config.url, topics = topics.len(), "channel connected");
        self.emit(&ChannelEvent::Connected);
    }

    fn handle_frame(&self, text: &str) {
        match ChannelMessage::parse(text) {
            Ok(message) => {
                tracing::trace!(kind = %message.kind, "channel message");
                self.emit(&ChannelEvent::Message(message));
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed channel frame");
            }
        }
    }

    /// Close path shared by remote closes, socket errors and failed opens.
    fn handle_close(&self, generation: u64, reason: Option<String>) {
        if !self.is_current(generation) {
            return;
        }
        lock(&self.inner.link).take();

        let action = {
            let mut record = lock(&self.inner.record);
            let Some(record) = record.as_mut() else {
                return;
            };
            record.state = TransportState::Disconnected;
            let reconnect = &self.inner.config.reconnect;
            if reconnect
                .max_attempts
                .is_some_and(|max| record.reconnect_attempt >= max)
            {
                record.pending_reconnect = None;
                CloseAction::Exhausted {
                    attempts: record.reconnect_attempt,
                }
            } else {
                record.reconnect_attempt += 1;
                let delay = reconnect.delay_for_attempt(record.reconnect_attempt);
                record.pending_reconnect = Some(delay);
                CloseAction::Retry {
                    attempt: record.reconnect_attempt,
                    delay,
                }
            }
        };

        self.inner
            .state_tx
            .send_replace(TransportState::Disconnected);
        self.emit(&ChannelEvent::Disconnected { reason });

        match action {
            CloseAction::Retry { attempt, delay } => {
                tracing::info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "channel reconnect scheduled"
                );
                let task = ScheduledTask::after(delay, reconnect_attempt(self.clone(), generation));
                if let Some(previous) = lock(&self.inner.reconnect).replace(task) {
                    previous.cancel();
                }
            }
            CloseAction::Exhausted { attempts } => {
                tracing::warn!(attempts, "channel reconnect attempts exhausted");
                self.emit(&ChannelEvent::MaxReconnectAttemptsReached { attempts });
            }
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &*self.inner.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Body of a scheduled reconnect. Boxed so the open → close → schedule
/// path does not produce a recursive future type.
fn reconnect_attempt(channel: Channel, generation: u64) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if !channel.is_current(generation) {
            return;
        }
        lock(&channel.inner.reconnect).take();
        if let Some(record) = lock(&channel.inner.record).as_mut() {
            record.pending_reconnect = None;
        }
        if let Err(e) = channel.open().await {
            tracing::debug!(error = %e, "reconnect attempt failed");
        }
    })
}

async fn next_ping(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Pump one open socket until it closes or the link is cancelled.
async fn run_socket(
    channel: Channel,
    generation: u64,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let Socket {
        mut sink,
        mut stream,
    } = socket;

    let ping_every = channel.inner.config.ping_interval;
    let mut keepalive = (!ping_every.is_zero()).then(|| {
        let mut interval = tokio::time::interval_at(Instant::now() + ping_every, ping_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                return;
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = sink.send(frame).await {
                    break Some(e.to_string());
                }
            }
            () = next_ping(&mut keepalive) => {
                let Ok(frame) = ChannelMessage::ping().to_json() else {
                    continue;
                };
                if let Err(e) = sink.send(frame).await {
                    break Some(e.to_string());
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(text)) => channel.handle_frame(&text),
                Some(Err(e)) => break Some(e.to_string()),
                None => break None,
            },
        }
    };

    tracing::info!(reason = reason.as_deref().unwrap_or("closed by peer"), "channel closed");
    channel.handle_close(generation, reason);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;

    use futures_util::sink;
    use pretty_assertions::assert_eq;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;

    // ── In-memory connector ──────────────────────────────────────────

    enum Script {
        Accept,
        Refuse,
    }

    /// Remote end of an accepted fake socket.
    struct Peer {
        to_client: mpsc::UnboundedSender<Result<String, Error>>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl Peer {
        fn push(&self, text: &str) {
            self.to_client.send(Ok(text.to_owned())).unwrap();
        }

        fn sent(&mut self) -> Vec<serde_json::Value> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.from_client.try_recv() {
                frames.push(serde_json::from_str(&frame).unwrap());
            }
            frames
        }
    }

    #[derive(Default)]
    struct FakeState {
        script: VecDeque<Script>,
        attempts: Vec<Instant>,
        peers: VecDeque<Peer>,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeConnector {
        fn scripted(script: impl IntoIterator<Item = Script>) -> Self {
            let connector = Self::default();
            lock(&connector.state).script = script.into_iter().collect();
            connector
        }

        fn attempts(&self) -> Vec<Instant> {
            lock(&self.state).attempts.clone()
        }

        fn take_peer(&self) -> Peer {
            lock(&self.state).peers.pop_front().unwrap()
        }
    }

    impl Connector for FakeConnector {
        fn connect(&self, _url: &Url) -> BoxFuture<'static, Result<Socket, Error>> {
            let mut state = lock(&self.state);
            state.attempts.push(Instant::now());
            let outcome = match state.script.pop_front().unwrap_or(Script::Refuse) {
                Script::Refuse => Err(Error::WebSocketConnect("connection refused".into())),
                Script::Accept => {
                    let (to_client, inbound) = mpsc::unbounded_channel();
                    let (outbound, from_client) = mpsc::unbounded_channel::<String>();
                    state.peers.push_back(Peer {
                        to_client,
                        from_client,
                    });
                    let sink = sink::unfold(outbound, |tx, frame: String| async move {
                        tx.send(frame).map_err(|_| Error::NotConnected)?;
                        Ok::<_, Error>(tx)
                    });
                    Ok(Socket {
                        sink: Box::pin(sink),
                        stream: UnboundedReceiverStream::new(inbound).boxed(),
                    })
                }
            };
            Box::pin(async move { outcome })
        }
    }

    fn config(max_attempts: Option<u32>) -> ChannelConfig {
        let mut config = ChannelConfig::new(Url::parse("ws://robot.local:8765/ws").unwrap());
        config.reconnect = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            max_attempts,
        };
        config
    }

    fn record_topics(channel: &Channel) -> Arc<Mutex<Vec<Topic>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for topic in [
            Topic::Connected,
            Topic::Disconnected,
            Topic::Error,
            Topic::MaxReconnectAttemptsReached,
            Topic::BatteryUpdate,
        ] {
            let seen = Arc::clone(&seen);
            channel.on(topic, move |event| lock(&seen).push(event.topic()));
        }
        seen
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    // ── Backoff ──────────────────────────────────────────────────────

    #[test]
    fn delay_doubles_and_caps() {
        let cfg = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            max_attempts: None,
        };
        let delays: Vec<u128> = (1..=6)
            .map(|n| cfg.delay_for_attempt(n).as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000]);
        assert_eq!(cfg.delay_for_attempt(200), Duration::from_millis(1_000));
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn connect_opens_and_emits_connected() {
        let connector = FakeConnector::scripted([Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));
        let seen = record_topics(&channel);

        channel.connect().await.unwrap();

        assert!(channel.is_connected());
        assert_eq!(*channel.state().borrow(), TransportState::Connected);
        let record = channel.record().unwrap();
        assert_eq!(record.state, TransportState::Connected);
        assert_eq!(record.reconnect_attempt, 0);
        assert_eq!(*lock(&seen), vec![Topic::Connected]);

        // Already open: no second attempt.
        channel.connect().await.unwrap();
        assert_eq!(connector.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_with_exponential_backoff_and_resets_counter() {
        let connector = FakeConnector::scripted([
            Script::Accept,
            Script::Refuse,
            Script::Refuse,
            Script::Accept,
        ]);
        let channel = Channel::with_connector(config(Some(5)), Arc::new(connector.clone()));
        let started = Instant::now();

        channel.connect().await.unwrap();
        drop(connector.take_peer());
        settle().await;

        let record = channel.record().unwrap();
        assert_eq!(record.reconnect_attempt, 1);
        assert_eq!(record.pending_reconnect, Some(Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(800)).await;
        settle().await;

        let offsets: Vec<u128> = connector
            .attempts()
            .iter()
            .map(|at| (*at - started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 100, 300, 700]);

        let record = channel.record().unwrap();
        assert_eq!(record.state, TransportState::Connected);
        assert_eq!(record.reconnect_attempt, 0);
        assert_eq!(record.pending_reconnect, None);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let connector = FakeConnector::scripted([Script::Accept]);
        let channel = Channel::with_connector(config(Some(2)), Arc::new(connector.clone()));
        let seen = record_topics(&channel);

        channel.connect().await.unwrap();
        drop(connector.take_peer());
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;

        // Initial open plus two reconnects.
        assert_eq!(connector.attempts().len(), 3);
        assert_eq!(
            lock(&seen).last(),
            Some(&Topic::MaxReconnectAttemptsReached)
        );
        let terminal = lock(&seen)
            .iter()
            .filter(|t| **t == Topic::MaxReconnectAttemptsReached)
            .count();
        assert_eq!(terminal, 1);
        assert!(!channel.is_connected());
        assert_eq!(channel.record().unwrap().pending_reconnect, None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_rejects_then_reconnects_through_close_path() {
        let connector = FakeConnector::scripted([Script::Refuse, Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));
        let seen = record_topics(&channel);

        let err = channel.connect().await.unwrap_err();
        assert!(matches!(err, Error::WebSocketConnect(_)));
        assert_eq!(*lock(&seen), vec![Topic::Error, Topic::Disconnected]);
        assert_eq!(channel.record().unwrap().reconnect_attempt, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;

        assert!(channel.is_connected());
        assert_eq!(connector.attempts().len(), 2);
        assert_eq!(lock(&seen).last(), Some(&Topic::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let connector = FakeConnector::scripted([Script::Accept, Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));

        channel.connect().await.unwrap();
        drop(connector.take_peer());
        settle().await;
        assert!(channel.record().unwrap().pending_reconnect.is_some());

        channel.disconnect();
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(connector.attempts().len(), 1);
        assert!(channel.record().is_none());
        assert_eq!(*channel.state().borrow(), TransportState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_disconnect_emits_disconnected_without_reconnect() {
        let connector = FakeConnector::scripted([Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));
        let seen = record_topics(&channel);

        channel.connect().await.unwrap();
        channel.disconnect();
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(*lock(&seen), vec![Topic::Connected, Topic::Disconnected]);
        assert_eq!(connector.attempts().len(), 1);
    }

    // ── Messaging ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_are_dropped() {
        let connector = FakeConnector::scripted([Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));
        let payloads = Arc::new(Mutex::new(Vec::new()));
        {
            let payloads = Arc::clone(&payloads);
            channel.on(Topic::BatteryUpdate, move |event| {
                if let Some(msg) = event.as_message() {
                    lock(&payloads).push(msg.payload["percentage"].clone());
                }
            });
        }

        channel.connect().await.unwrap();
        let peer = connector.take_peer();
        peer.push("{not json");
        peer.push(r#"{"percentage":10}"#);
        peer.push(r#"{"type":"battery_update","percentage":64}"#);
        settle().await;

        assert_eq!(*lock(&payloads), vec![serde_json::json!(64)]);
        assert!(channel.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn send_only_while_open_and_topics_are_reannounced() {
        let connector = FakeConnector::scripted([Script::Accept, Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));

        assert!(!channel.send(&ChannelMessage::request_status()));
        assert!(!channel.subscribe(&Topic::RobotStatusUpdate));

        channel.connect().await.unwrap();
        let mut first = connector.take_peer();
        assert!(channel.subscribe(&Topic::BatteryUpdate));
        assert!(channel.send(&ChannelMessage::request_status()));
        settle().await;

        assert_eq!(
            first.sent(),
            vec![
                serde_json::json!({ "type": "subscribe", "topic": "robot_status_update" }),
                serde_json::json!({ "type": "subscribe", "topic": "battery_update" }),
                serde_json::json!({ "type": "request_status_update" }),
            ]
        );

        drop(first);
        tokio::time::sleep(Duration::from_millis(150)).await;
        settle().await;

        let mut second = connector.take_peer();
        assert_eq!(
            second.sent(),
            vec![
                serde_json::json!({ "type": "subscribe", "topic": "battery_update" }),
                serde_json::json!({ "type": "subscribe", "topic": "robot_status_update" }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn off_removes_only_that_handler() {
        let connector = FakeConnector::scripted([Script::Accept]);
        let channel = Channel::with_connector(config(Some(3)), Arc::new(connector.clone()));
        let log = Arc::new(Mutex::new(Vec::new()));
        let tokens: Vec<SubscriptionToken> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let log = Arc::clone(&log);
                channel.on(Topic::Connected, move |_| lock(&log).push(name))
            })
            .collect();

        assert!(channel.off(tokens[1]));
        assert!(!channel.off(tokens[1]));
        channel.connect().await.unwrap();

        assert_eq!(*lock(&log), vec!["a", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_while_open() {
        let connector = FakeConnector::scripted([Script::Accept]);
        let mut cfg = config(Some(3));
        cfg.ping_interval = Duration::from_secs(15);
        let channel = Channel::with_connector(cfg, Arc::new(connector.clone()));

        channel.connect().await.unwrap();
        let mut peer = connector.take_peer();
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        let pings = peer
            .sent()
            .into_iter()
            .filter(|frame| frame["type"] == "ping")
            .count();
        assert_eq!(pings, 2);
    }
}
