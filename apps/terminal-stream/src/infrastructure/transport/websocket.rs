//! WebSocket Transport
//!
//! tokio-tungstenite adapter for the [`Transport`] port. Text frames pass
//! through as-is; binary frames are decoded as UTF-8. Control frames never
//! reach the inbound stream.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Socket, SocketWriter, Transport, TransportError};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Opens `ws://` and `wss://` sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let (write, read) = ws_stream.split();

        let inbound = read
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(data)) => {
                        if let Ok(text) = String::from_utf8(data.to_vec()) {
                            Some(Ok(text))
                        } else {
                            tracing::warn!(len = data.len(), "Received non-UTF8 binary message");
                            None
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "Server sent close frame");
                        None
                    }
                    Ok(_) => None,
                    Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => None,
                    Err(e) => Some(Err(TransportError::Protocol(e.to_string()))),
                }
            })
            .boxed();

        Ok(Socket {
            writer: Box::new(WebSocketWriter { sink: write }),
            inbound,
        })
    }
}

struct WebSocketWriter {
    sink: WsSink,
}

#[async_trait]
impl SocketWriter for WebSocketWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
                other => TransportError::Send(other.to_string()),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }
}
