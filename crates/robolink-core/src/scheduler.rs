// ── Lifecycle-aware poll scheduler ──
//
// Fallback for when the realtime channel is not delivering events. In the
// foreground a full-state fetch runs on every tick the channel is down; in
// the background the cadence slows and a connected channel is merely
// nudged with `request_status_update`. Fetched state is forwarded to the
// merge task as `Source::Poll` updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatcher::Dispatcher;
use crate::lock;
use crate::model::{Source, SourcedUpdate, StatePatch, Update};
use crate::transport::ChannelLink;

/// Whether the host application is visible to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Foreground,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub foreground_interval: Duration,
    pub background_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            foreground_interval: Duration::from_secs(10),
            background_interval: Duration::from_secs(30),
        }
    }
}

impl PollConfig {
    pub fn interval_for(&self, lifecycle: Lifecycle) -> Duration {
        match lifecycle {
            Lifecycle::Foreground => self.foreground_interval,
            Lifecycle::Background => self.background_interval,
        }
    }
}

// ── PollScheduler ────────────────────────────────────────────────────

/// Cheaply cloneable handle to the poll loop.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    dispatcher: Dispatcher,
    channel: Arc<dyn ChannelLink>,
    config: PollConfig,
    updates: mpsc::UnboundedSender<SourcedUpdate>,
    lifecycle: Mutex<Lifecycle>,
    /// Bumped by `stop()` and every cadence switch; fetches started under
    /// an older value are discarded.
    generation: AtomicU64,
    running: Mutex<Option<PollTask>>,
}

struct PollTask {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

impl PollScheduler {
    pub fn new(
        dispatcher: Dispatcher,
        channel: Arc<dyn ChannelLink>,
        config: PollConfig,
        updates: mpsc::UnboundedSender<SourcedUpdate>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                dispatcher,
                channel,
                config,
                updates,
                lifecycle: Mutex::new(Lifecycle::Foreground),
                generation: AtomicU64::new(0),
                running: Mutex::new(None),
            }),
        }
    }

    /// Start polling at the cadence of the current lifecycle. No-op if
    /// already running.
    pub fn start(&self) {
        if lock(&self.inner.running).is_some() {
            return;
        }
        let lifecycle = self.lifecycle();
        self.spawn_loop(lifecycle, false);
    }

    /// Stop polling. A fetch in flight completes but its result is dropped.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = lock(&self.inner.running).take() {
            task.cancel.cancel();
            debug!("poll scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.running).is_some()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *lock(&self.inner.lifecycle)
    }

    /// Switch cadence.
    ///
    /// Entering the foreground also re-opens the channel if needed and
    /// fetches once immediately. Takes effect on the next `start()` when
    /// the scheduler is stopped.
    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        let previous = std::mem::replace(&mut *lock(&self.inner.lifecycle), lifecycle);
        if previous == lifecycle || !self.is_running() {
            return;
        }
        debug!(?lifecycle, "poll cadence switching");
        self.stop();
        self.spawn_loop(lifecycle, lifecycle == Lifecycle::Foreground);
    }

    fn spawn_loop(&self, lifecycle: Lifecycle, resume: bool) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(
            Arc::clone(&self.inner),
            generation,
            lifecycle,
            resume,
            cancel.clone(),
        ));
        *lock(&self.inner.running) = Some(PollTask {
            cancel,
            _handle: handle,
        });
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("lifecycle", &self.lifecycle())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// ── Background task ──────────────────────────────────────────────────

async fn poll_task(
    inner: Arc<SchedulerInner>,
    generation: u64,
    lifecycle: Lifecycle,
    resume: bool,
    cancel: CancellationToken,
) {
    if resume {
        if !inner.channel.is_connected() {
            if let Err(e) = inner.channel.reconnect().await {
                debug!(error = %e, "channel reconnect on resume failed");
            }
        }
        inner.fetch(generation).await;
    }

    let mut interval = tokio::time::interval(inner.config.interval_for(lifecycle));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => inner.tick(generation, lifecycle).await,
        }
    }
}

impl SchedulerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn tick(&self, generation: u64, lifecycle: Lifecycle) {
        if !self.dispatcher.is_online() && !self.dispatcher.check_connection().await {
            trace!("device still offline, skipping poll");
            return;
        }

        let connected = self.channel.is_connected();
        match (lifecycle, connected) {
            (Lifecycle::Foreground, true) => trace!("channel connected, no poll needed"),
            (Lifecycle::Background, true) => {
                if !self.channel.request_status() {
                    self.fetch(generation).await;
                }
            }
            (_, false) => self.fetch(generation).await,
        }
    }

    async fn fetch(&self, generation: u64) {
        let result = self.dispatcher.fetch_state().await;
        if !self.is_current(generation) {
            debug!("discarding poll result from a stopped cadence");
            return;
        }
        let data = match result {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "poll fetch failed");
                return;
            }
        };
        match serde_json::from_value::<StatePatch>(data) {
            Ok(patch) => {
                let update = SourcedUpdate::new(Source::Poll, Update::FullState(Box::new(patch)));
                if self.updates.send(update).is_err() {
                    debug!("merge task gone, dropping poll result");
                }
            }
            Err(e) => debug!(error = %e, "dropping malformed status payload"),
        }
    }
}
