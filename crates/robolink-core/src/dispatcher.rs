// ── Command dispatcher ──
//
// Delivers commands over the request/response transport and holds the
// ones that could not be delivered in a bounded FIFO. The queue and the
// online flag are only ever mutated through the methods below: explicit
// sends, flushes and connectivity probes all share one path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use robolink_api::{CommandRequest, ResponseEnvelope};

use crate::command::{self, DropReason, DroppedCommand, QueuedCommand};
use crate::error::CoreError;
use crate::lock;
use crate::transport::CommandTransport;

const NOTICE_CHANNEL_SIZE: usize = 64;

// ── Configuration ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Deadline for every request.
    pub request_timeout: Duration,
    /// Failed queue attempts before a command is dropped.
    pub max_retries: u32,
    /// Queue capacity; the oldest entries are evicted past it.
    pub max_queue_len: usize,
    /// Pause between consecutive sends while flushing.
    pub flush_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            max_queue_len: 50,
            flush_delay: Duration::from_millis(50),
        }
    }
}

// ── Outcomes ─────────────────────────────────────────────────────────

/// What happened to a command handed to [`Dispatcher::send_command`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The device accepted it.
    Delivered(ResponseEnvelope),
    /// It is waiting in the queue under this id.
    Queued(Uuid),
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Summary of one [`Dispatcher::flush_queue`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Failed but kept for another try.
    pub retained: usize,
    pub dropped: usize,
    /// Another flush was already running; nothing was attempted.
    pub skipped: bool,
    /// Queue length when the run finished.
    pub remaining: usize,
}

enum Attempt {
    Delivered(ResponseEnvelope),
    /// The device answered but refused.
    Rejected(String),
    /// Transport failure or deadline; the device is treated as offline.
    Unreachable(CoreError),
    /// Local failure (bad URL, undecodable body); the device may be fine.
    Failed(CoreError),
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Command dispatcher. Cheaply cloneable; clones share queue and state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    transport: Arc<dyn CommandTransport>,
    config: DispatcherConfig,
    queue: Mutex<VecDeque<QueuedCommand>>,
    queue_len: watch::Sender<usize>,
    online: watch::Sender<bool>,
    flushing: AtomicBool,
    notices: broadcast::Sender<DroppedCommand>,
}

/// Clears the in-progress flag when a flush ends, however it ends.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    /// The dispatcher starts out assuming the device is online.
    pub fn new(transport: Arc<dyn CommandTransport>, config: DispatcherConfig) -> Self {
        let (queue_len, _) = watch::channel(0);
        let (online, _) = watch::channel(true);
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_SIZE);
        Self {
            inner: Arc::new(DispatcherInner {
                transport,
                config,
                queue: Mutex::new(VecDeque::new()),
                queue_len,
                online,
                flushing: AtomicBool::new(false),
                notices,
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Deliver a command now, or queue it.
    ///
    /// Offline: queued without an attempt. Online: attempted once; any
    /// failure queues it, and transport failures also flip the dispatcher
    /// offline. Only invalid commands return `Err`.
    pub async fn send_command(&self, name: &str, params: Value) -> Result<SendOutcome, CoreError> {
        let request = command::route(name, &params)?;

        if !self.is_online() {
            debug!(command = name, "offline, queueing without attempt");
            return Ok(SendOutcome::Queued(self.queue_command(name, params)));
        }

        match self.attempt(request).await {
            Attempt::Delivered(envelope) => {
                debug!(command = name, "command delivered");
                Ok(SendOutcome::Delivered(envelope))
            }
            Attempt::Rejected(message) => {
                warn!(command = name, %message, "command rejected, queueing for retry");
                Ok(SendOutcome::Queued(self.queue_command(name, params)))
            }
            Attempt::Unreachable(e) => {
                warn!(command = name, error = %e, "device unreachable, queueing command");
                self.set_online(false);
                Ok(SendOutcome::Queued(self.queue_command(name, params)))
            }
            Attempt::Failed(e) => {
                warn!(command = name, error = %e, "command failed, queueing for retry");
                Ok(SendOutcome::Queued(self.queue_command(name, params)))
            }
        }
    }

    /// Append a command to the queue, evicting the oldest entries past
    /// capacity. Returns the new entry's id.
    pub fn queue_command(&self, name: &str, params: Value) -> Uuid {
        let command = QueuedCommand::new(name, params);
        let id = command.id;

        let evicted: Vec<QueuedCommand> = {
            let mut queue = lock(&self.inner.queue);
            queue.push_back(command);
            let excess = queue.len().saturating_sub(self.inner.config.max_queue_len);
            let evicted = queue.drain(..excess).collect();
            self.inner.queue_len.send_replace(queue.len());
            evicted
        };

        for command in evicted {
            self.drop_command(command, DropReason::Capacity);
        }
        id
    }

    /// Drain the queue in order, one command at a time.
    ///
    /// Each command present when the flush starts is attempted at most
    /// once. A concurrent call returns immediately with `skipped` set.
    /// On a transport failure the flush stops, the dispatcher goes offline
    /// and the unattempted commands stay queued in their original order.
    pub async fn flush_queue(&self) -> FlushReport {
        if self.inner.flushing.swap(true, Ordering::AcqRel) {
            debug!("flush already in progress, skipping");
            return FlushReport {
                skipped: true,
                remaining: self.queue_len(),
                ..FlushReport::default()
            };
        }
        let _guard = FlushGuard(&self.inner.flushing);

        let cycle: Vec<Uuid> = lock(&self.inner.queue).iter().map(|c| c.id).collect();
        let mut report = FlushReport::default();

        for id in cycle {
            // Evicted for capacity while we were busy.
            let Some(command) = self.find(id) else {
                continue;
            };
            let request = match command::route(&command.name, &command.params) {
                Ok(request) => request,
                Err(e) => {
                    warn!(command = %command.name, error = %e, "unroutable command in queue");
                    if let Some(command) = self.remove(id) {
                        self.drop_command(command, DropReason::Invalid);
                    }
                    report.dropped += 1;
                    continue;
                }
            };

            if report.attempted > 0 {
                tokio::time::sleep(self.inner.config.flush_delay).await;
            }
            report.attempted += 1;

            match self.attempt(request).await {
                Attempt::Delivered(_) => {
                    self.remove(id);
                    report.delivered += 1;
                }
                Attempt::Rejected(message) => {
                    debug!(command = %command.name, %message, "queued command rejected");
                    self.record_failure(id, &mut report);
                }
                Attempt::Failed(e) => {
                    debug!(command = %command.name, error = %e, "queued command failed");
                    self.record_failure(id, &mut report);
                }
                Attempt::Unreachable(e) => {
                    warn!(command = %command.name, error = %e, "device unreachable, pausing flush");
                    self.record_failure(id, &mut report);
                    self.set_online(false);
                    break;
                }
            }
        }

        report.remaining = self.queue_len();
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            dropped = report.dropped,
            remaining = report.remaining,
            "queue flushed"
        );
        report
    }

    // ── Connectivity ─────────────────────────────────────────────────

    /// Probe the device. Any HTTP answer counts as reachable. When the
    /// device is reachable and commands are waiting, the queue is flushed
    /// before returning.
    pub async fn check_connection(&self) -> bool {
        let reachable = match self.inner.transport.probe().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "connectivity probe failed");
                false
            }
        };
        self.set_online(reachable);

        if reachable && self.queue_len() > 0 {
            self.flush_queue().await;
        }
        reachable
    }

    /// Full-state fetch (`GET /status`), returning the response data.
    pub async fn fetch_state(&self) -> Result<Value, CoreError> {
        let request = command::route("get_status", &Value::Null)?;
        match self.attempt(request).await {
            Attempt::Delivered(envelope) => {
                self.set_online(true);
                Ok(envelope.data.unwrap_or(Value::Null))
            }
            Attempt::Rejected(message) => {
                self.set_online(true);
                Err(CoreError::Rejected { message })
            }
            Attempt::Unreachable(e) => {
                self.set_online(false);
                Err(e)
            }
            Attempt::Failed(e) => Err(e),
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    pub fn online(&self) -> watch::Receiver<bool> {
        self.inner.online.subscribe()
    }

    pub fn queue_len(&self) -> usize {
        *self.inner.queue_len.borrow()
    }

    pub fn queue_len_watch(&self) -> watch::Receiver<usize> {
        self.inner.queue_len.subscribe()
    }

    /// Snapshot of the queue, oldest first.
    pub fn queued(&self) -> Vec<QueuedCommand> {
        lock(&self.inner.queue).iter().cloned().collect()
    }

    /// Dropped-command notices.
    pub fn notices(&self) -> broadcast::Receiver<DroppedCommand> {
        self.inner.notices.subscribe()
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn attempt(&self, request: CommandRequest) -> Attempt {
        let request = request.with_timeout(self.inner.config.request_timeout);
        match self.inner.transport.execute(request).await {
            Ok(envelope) if envelope.success => Attempt::Delivered(envelope),
            Ok(envelope) => Attempt::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| format!("HTTP {}", envelope.status)),
            ),
            Err(e) if e.is_unreachable() => Attempt::Unreachable(e.into()),
            Err(e) => Attempt::Failed(e.into()),
        }
    }

    fn set_online(&self, online: bool) {
        let changed = self.inner.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "device connectivity changed");
        }
    }

    fn find(&self, id: Uuid) -> Option<QueuedCommand> {
        lock(&self.inner.queue).iter().find(|c| c.id == id).cloned()
    }

    fn remove(&self, id: Uuid) -> Option<QueuedCommand> {
        let mut queue = lock(&self.inner.queue);
        let index = queue.iter().position(|c| c.id == id)?;
        let command = queue.remove(index);
        self.inner.queue_len.send_replace(queue.len());
        command
    }

    /// Count a failed attempt against `id`, dropping it at the limit.
    fn record_failure(&self, id: Uuid, report: &mut FlushReport) {
        let exhausted = {
            let mut queue = lock(&self.inner.queue);
            let Some(index) = queue.iter().position(|c| c.id == id) else {
                return;
            };
            let retries = queue.get_mut(index).map_or(0, |command| {
                command.retry_count += 1;
                command.retry_count
            });
            if retries >= self.inner.config.max_retries {
                let command = queue.remove(index);
                self.inner.queue_len.send_replace(queue.len());
                command
            } else {
                None
            }
        };

        match exhausted {
            Some(command) => {
                report.dropped += 1;
                self.drop_command(command, DropReason::RetriesExhausted);
            }
            None => report.retained += 1,
        }
    }

    fn drop_command(&self, command: QueuedCommand, reason: DropReason) {
        warn!(
            command = %command.name,
            id = %command.id,
            retries = command.retry_count,
            %reason,
            "dropping queued command"
        );
        // No receivers is fine; the notice is informational.
        let _ = self.inner.notices.send(DroppedCommand { command, reason });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("online", &self.is_online())
            .field("queue_len", &self.queue_len())
            .finish_non_exhaustive()
    }
}
