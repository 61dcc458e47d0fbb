// ── Transport seams ──
//
// The dispatcher and poll scheduler talk to the device through these
// traits so tests can substitute in-memory fakes. Production impls wrap
// `robolink_api::DeviceClient` and `robolink_api::Channel`.

use futures_util::future::BoxFuture;
use robolink_api::{Channel, ChannelMessage, CommandRequest, DeviceClient, ResponseEnvelope};

/// Request/response command surface of the device.
pub trait CommandTransport: Send + Sync + 'static {
    fn execute(
        &self,
        request: CommandRequest,
    ) -> BoxFuture<'static, Result<ResponseEnvelope, robolink_api::Error>>;

    /// Lightweight liveness probe.
    fn probe(&self) -> BoxFuture<'static, Result<ResponseEnvelope, robolink_api::Error>>;
}

impl CommandTransport for DeviceClient {
    fn execute(
        &self,
        request: CommandRequest,
    ) -> BoxFuture<'static, Result<ResponseEnvelope, robolink_api::Error>> {
        let client = self.clone();
        Box::pin(async move { client.execute(&request).await })
    }

    fn probe(&self) -> BoxFuture<'static, Result<ResponseEnvelope, robolink_api::Error>> {
        let client = self.clone();
        Box::pin(async move { client.probe().await })
    }
}

/// What the poll scheduler needs from the realtime channel.
pub trait ChannelLink: Send + Sync + 'static {
    fn is_connected(&self) -> bool;

    /// Ask the device to push its current state. Returns whether the
    /// request was sent.
    fn request_status(&self) -> bool;

    /// Re-open the channel if it is not open.
    fn reconnect(&self) -> BoxFuture<'static, Result<(), robolink_api::Error>>;
}

impl ChannelLink for Channel {
    fn is_connected(&self) -> bool {
        Channel::is_connected(self)
    }

    fn request_status(&self) -> bool {
        self.send(&ChannelMessage::request_status())
    }

    fn reconnect(&self) -> BoxFuture<'static, Result<(), robolink_api::Error>> {
        let channel = self.clone();
        Box::pin(async move { channel.connect().await })
    }
}
