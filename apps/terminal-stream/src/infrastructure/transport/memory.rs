//! In-Memory Transport
//!
//! Channel-backed [`Transport`] used to drive connections without a network.
//! Each armed endpoint accepts exactly one connect; arm it again to accept a
//! reconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::application::ports::{Socket, SocketWriter, Transport, TransportError};

type InboundTx = mpsc::UnboundedSender<Result<String, TransportError>>;

struct ClientHalves {
    sent_tx: mpsc::UnboundedSender<String>,
    inbound_rx: mpsc::UnboundedReceiver<Result<String, TransportError>>,
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
struct Endpoint {
    armed: Option<ClientHalves>,
    refusals: u32,
    connects: usize,
}

/// Transport whose peers are test-controlled channels.
#[derive(Default)]
pub struct MemoryTransport {
    endpoints: Mutex<HashMap<String, Endpoint>>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let urls: Vec<_> = self.endpoints.lock().keys().cloned().collect();
        f.debug_struct("MemoryTransport").field("endpoints", &urls).finish()
    }
}

impl MemoryTransport {
    /// Create a transport with no endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `url` to accept the next connect and return its peer.
    pub fn expect(&self, url: &str) -> MemoryPeer {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        self.endpoints.lock().entry(url.to_string()).or_default().armed = Some(ClientHalves {
            sent_tx,
            inbound_rx,
            closed: Arc::clone(&closed),
        });

        MemoryPeer {
            sent_rx,
            inbound_tx: Some(inbound_tx),
            closed,
        }
    }

    /// Fail the next `count` connects to `url`.
    pub fn refuse(&self, url: &str, count: u32) {
        self.endpoints.lock().entry(url.to_string()).or_default().refusals += count;
    }

    /// Connect attempts made against `url`, refused ones included.
    #[must_use]
    pub fn connect_count(&self, url: &str) -> usize {
        self.endpoints.lock().get(url).map_or(0, |e| e.connects)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let halves = {
            let mut endpoints = self.endpoints.lock();
            let endpoint = endpoints.entry(url.to_string()).or_default();
            endpoint.connects += 1;

            if endpoint.refusals > 0 {
                endpoint.refusals -= 1;
                return Err(TransportError::ConnectFailed(format!("{url} refused connection")));
            }
            endpoint
                .armed
                .take()
                .ok_or_else(|| TransportError::ConnectFailed(format!("no endpoint at {url}")))?
        };

        Ok(Socket {
            writer: Box::new(MemoryWriter {
                sent_tx: halves.sent_tx,
                closed: halves.closed,
            }),
            inbound: UnboundedReceiverStream::new(halves.inbound_rx).boxed(),
        })
    }
}

struct MemoryWriter {
    sent_tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SocketWriter for MemoryWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.sent_tx
            .send(text)
            .map_err(|_| TransportError::Send("peer dropped".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Server side of an in-memory socket.
#[derive(Debug)]
pub struct MemoryPeer {
    sent_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: Option<InboundTx>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Deliver a payload to the client. Returns `false` once hung up.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.inbound_tx
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(text.into())).is_ok())
    }

    /// Deliver a transport error to the client.
    pub fn fail(&self, error: TransportError) -> bool {
        self.inbound_tx
            .as_ref()
            .is_some_and(|tx| tx.send(Err(error)).is_ok())
    }

    /// End the client's inbound stream.
    pub fn hang_up(&mut self) {
        self.inbound_tx = None;
    }

    /// Next payload the client sent, waiting for it.
    ///
    /// Returns `None` once the client's writer is gone and the buffer is empty.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }

    /// Next payload the client sent, if one is buffered.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent_rx.try_recv().ok()
    }

    /// Every buffered payload the client sent.
    pub fn drain_sent(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_next_sent()).collect()
    }

    /// Whether the client closed its writer.
    #[must_use]
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
