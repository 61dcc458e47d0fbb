// robolink-api: async transports for a networked cleaning robot
// (realtime channel + HTTP command surface)

pub mod channel;
pub mod client;
pub mod error;
pub mod schedule;
pub mod transport;

pub use channel::{
    Channel, ChannelConfig, ChannelEvent, ChannelMessage, ConnectionRecord, Connector,
    ReconnectConfig, SubscriptionToken, Topic, TransportState, WsConnector,
};
pub use client::{CommandRequest, DeviceClient, Method, ResponseEnvelope};
pub use error::Error;
pub use schedule::ScheduledTask;
pub use transport::TransportConfig;
