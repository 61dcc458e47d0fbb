// ── Runtime sync configuration ──
//
// Describes *where* the device lives and how hard to try reaching it.
// Never touches disk: hosts build a `SyncConfig` (usually through
// robolink-config) and hand it to the router.

use std::time::Duration;

use url::Url;

use robolink_api::{ChannelConfig, DeviceClient, ReconnectConfig, TransportConfig};

use crate::dispatcher::DispatcherConfig;
use crate::error::CoreError;
use crate::router::DEFAULT_LOW_BATTERY_THRESHOLD;
use crate::scheduler::PollConfig;

/// Everything needed to synchronize with one device.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Realtime channel endpoint (`ws://` or `wss://`).
    pub channel_url: Url,
    /// Base URL of the HTTP command surface.
    pub api_url: Url,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub max_queue_len: usize,
    pub flush_delay: Duration,
    pub reconnect: ReconnectConfig,
    pub connect_timeout: Duration,
    /// Zero disables keepalive pings.
    pub ping_interval: Duration,
    pub foreground_poll: Duration,
    pub background_poll: Duration,
    /// Battery percentage at or below which a warning is raised.
    pub low_battery_threshold: u8,
    /// Accept self-signed certificates on the command surface.
    pub accept_invalid_certs: bool,
}

impl SyncConfig {
    /// Defaults for everything but the two endpoints.
    pub fn new(channel_url: Url, api_url: Url) -> Self {
        let dispatcher = DispatcherConfig::default();
        let channel = ChannelConfig::new(channel_url.clone());
        let poll = PollConfig::default();
        Self {
            channel_url,
            api_url,
            request_timeout: dispatcher.request_timeout,
            max_retries: dispatcher.max_retries,
            max_queue_len: dispatcher.max_queue_len,
            flush_delay: dispatcher.flush_delay,
            reconnect: channel.reconnect,
            connect_timeout: channel.connect_timeout,
            ping_interval: channel.ping_interval,
            foreground_poll: poll.foreground_interval,
            background_poll: poll.background_interval,
            low_battery_threshold: DEFAULT_LOW_BATTERY_THRESHOLD,
            accept_invalid_certs: false,
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.channel_url.clone(),
            reconnect: self.reconnect.clone(),
            connect_timeout: self.connect_timeout,
            ping_interval: self.ping_interval,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            request_timeout: self.request_timeout,
            max_retries: self.max_retries,
            max_queue_len: self.max_queue_len,
            flush_delay: self.flush_delay,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            foreground_interval: self.foreground_poll,
            background_interval: self.background_poll,
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            accept_invalid_certs: self.accept_invalid_certs,
            ..TransportConfig::with_timeout(self.request_timeout)
        }
    }

    /// HTTP client for the command surface.
    pub fn device_client(&self) -> Result<DeviceClient, CoreError> {
        Ok(DeviceClient::new(self.api_url.clone(), &self.transport_config())?)
    }
}
