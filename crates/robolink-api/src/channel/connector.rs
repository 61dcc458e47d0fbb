// ── Socket connectors ──
//
// The channel never touches tungstenite directly: it asks a `Connector`
// for a `Socket` (a text-frame sink plus a text-frame stream). The
// production connector speaks WebSocket; tests plug in an in-memory one.

use std::pin::Pin;

use futures_util::future::{self, BoxFuture};
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::Error;

/// Outbound half of an open socket.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of an open socket. Ends when the remote side closes.
pub type FrameStream = BoxStream<'static, Result<String, Error>>;

/// An open text-frame socket.
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

/// Opens sockets for the channel.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Socket, Error>>;
}

// ── WebSocket connector ──────────────────────────────────────────────

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Socket, Error>> {
        let url = url.clone();
        Box::pin(async move {
            tracing::debug!(url = %url, "opening WebSocket");

            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

            let (write, read) = ws_stream.split();

            let sink = write
                .sink_map_err(|e| Error::WebSocketConnect(e.to_string()))
                .with(|text: String| future::ready(Ok::<_, Error>(Message::text(text))));

            let stream = read.filter_map(|frame| future::ready(text_frame(frame)));

            Ok(Socket {
                sink: Box::pin(sink),
                stream: stream.boxed(),
            })
        })
    }
}

/// Reduce a raw WebSocket frame to the text the channel cares about.
fn text_frame(
    frame: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<String, Error>> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Close(Some(cf))) => {
            tracing::info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame received");
            Some(Err(Error::WebSocketClosed {
                code: u16::from(cf.code),
                reason: cf.reason.as_str().to_owned(),
            }))
        }
        Ok(Message::Close(None)) => {
            tracing::info!("WebSocket close frame received (no payload)");
            None
        }
        // tungstenite answers pings itself; binary frames are not part of the protocol
        Ok(_) => None,
        Err(e) => Some(Err(Error::WebSocketConnect(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn text_frames_pass_through() {
        let frame = text_frame(Ok(Message::text(r#"{"type":"ping"}"#)));
        assert!(matches!(frame, Some(Ok(ref t)) if t == r#"{"type":"ping"}"#));
    }

    #[test]
    fn close_frame_becomes_closed_error() {
        let frame = text_frame(Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "server restart".into(),
        }))));
        assert!(matches!(
            frame,
            Some(Err(Error::WebSocketClosed { code: 1001, ref reason })) if reason == "server restart"
        ));
    }

    #[test]
    fn binary_frames_are_ignored() {
        assert!(text_frame(Ok(Message::binary(vec![1_u8, 2, 3]))).is_none());
    }
}
