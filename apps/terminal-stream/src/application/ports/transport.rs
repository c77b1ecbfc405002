//! Transport Port
//!
//! Both wire framings run over the same abstraction: a writer half that
//! sends text payloads and an inbound stream of text payloads.

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// A payload could not be written.
    #[error("send failed: {0}")]
    Send(String),

    /// The socket is already closed.
    #[error("connection closed")]
    Closed,

    /// The peer violated the transport protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Inbound payloads in delivery order. Ends when the peer closes.
pub type InboundStream = BoxStream<'static, Result<String, TransportError>>;

/// Writer half of an open socket.
#[async_trait]
pub trait SocketWriter: Send {
    /// Send one text payload.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the socket.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An open socket, split into its two halves.
pub struct Socket {
    /// Outbound half.
    pub writer: Box<dyn SocketWriter>,
    /// Inbound half.
    pub inbound: InboundStream,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

/// Opens sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket to `url`.
    async fn connect(&self, url: &str) -> Result<Socket, TransportError>;
}
