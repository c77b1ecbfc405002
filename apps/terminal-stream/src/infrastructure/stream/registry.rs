//! Connection Registry
//!
//! Owns the named connections of one terminal session and drives their
//! lifecycle: connect handshake, subscription flush, the inbound listener
//! task, and teardown.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --start--> Connecting --handshake ok--> Connected
//!      ^                      |                           |
//!      +------ failure -------+---- disconnect / peer ----+
//! ```
//!
//! Subscriptions are flushed once, at start. A topic declared on a live
//! connection gets its handler installed but no subscribe frame until the
//! next start.
//!
//! Nothing here reconnects on its own. `start_with_retry` is the opt-in
//! backoff path.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::codec::{Decoded, FrameCodec};
use super::reconnect::ReconnectPolicy;
use super::router::SubscriptionRouter;
use crate::application::ports::{
    InboundStream, Socket, SocketWriter, TopicHandler, Transport, TransportError,
};

// =============================================================================
// Types
// =============================================================================

/// Wire framing of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// STOMP-style frames with per-topic routing.
    Framed,
    /// Bare JSON payloads delivered to a single handler.
    Raw,
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket is open.
    #[default]
    Disconnected,
    /// Socket opening or handshake in flight.
    Connecting,
    /// Handshake done and listener running.
    Connected,
}

/// Registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A connection with this id is already registered.
    #[error("connection '{0}' already exists")]
    AlreadyExists(String),

    /// No connection with this id is registered.
    #[error("unknown connection '{0}'")]
    UnknownConnection(String),

    /// The connection has no open socket.
    #[error("connection '{0}' is not connected")]
    NotConnected(String),

    /// Opening, handshaking or writing failed.
    #[error("transport error on '{id}': {source}")]
    Transport {
        /// Connection id.
        id: String,
        /// Underlying failure.
        #[source]
        source: TransportError,
    },

    /// `start_with_retry` gave up.
    #[error("connection '{id}' failed after {attempts} attempts")]
    RetriesExhausted {
        /// Connection id.
        id: String,
        /// Attempts made, including the first.
        attempts: u32,
    },
}

struct LiveLink {
    writer: Box<dyn SocketWriter>,
    cancel: CancellationToken,
    listener: JoinHandle<()>,
}

struct Connection {
    id: String,
    url: String,
    protocol: Protocol,
    router: SubscriptionRouter,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<LiveLink>>,
}

impl Connection {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn handle_payload(&self, codec: &FrameCodec, text: &str) {
        match self.protocol {
            Protocol::Framed => self.handle_frame(codec, text),
            Protocol::Raw => match serde_json::from_str::<Value>(text) {
                Ok(payload) => {
                    self.router.dispatch_sole(payload);
                }
                Err(e) => {
                    tracing::warn!(connection = %self.id, error = %e, "Dropping non-JSON payload");
                }
            },
        }
    }

    fn handle_frame(&self, codec: &FrameCodec, text: &str) {
        match codec.decode(text) {
            Ok(Decoded::Heartbeat) => tracing::trace!(connection = %self.id, "Heartbeat"),
            Ok(Decoded::ConnectAck { version }) => {
                tracing::debug!(connection = %self.id, version = %version, "Connect acknowledged");
            }
            Ok(Decoded::Message(msg)) => match msg.body {
                Some(body) => {
                    self.router.dispatch(&msg.destination, body);
                }
                None => {
                    tracing::debug!(
                        connection = %self.id,
                        destination = %msg.destination,
                        "Dropping empty-body message"
                    );
                }
            },
            Err(e) => tracing::warn!(connection = %self.id, error = %e, "Dropping undecodable frame"),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Caller-owned set of named connections.
pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    codec: FrameCodec,
    connections: RwLock<BTreeMap<String, Arc<Connection>>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connection_ids())
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(),
            connections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Declare a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] if `id` is taken.
    pub fn add_connection(&self, id: &str, url: &str, protocol: Protocol) -> Result<(), RegistryError> {
        let mut connections = self.connections.write();
        if connections.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.to_string()));
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        connections.insert(
            id.to_string(),
            Arc::new(Connection {
                id: id.to_string(),
                url: url.to_string(),
                protocol,
                router: SubscriptionRouter::new(),
                state,
                link: Mutex::new(None),
            }),
        );
        tracing::debug!(connection = %id, url = %url, ?protocol, "Connection declared");
        Ok(())
    }

    /// Disconnect if needed and forget the connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for an unknown id.
    pub async fn remove_connection(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self
            .connections
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.to_string()))?;
        Self::teardown(&conn).await;
        tracing::debug!(connection = %id, "Connection removed");
        Ok(())
    }

    /// Install `handler` for `topic` and return the subscription id.
    ///
    /// Raw connections hold a single handler; a second call replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for an unknown id.
    pub fn add_subscription(
        &self,
        id: &str,
        topic: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> Result<String, RegistryError> {
        let conn = self.get(id)?;
        let subscription_id = match conn.protocol {
            Protocol::Framed => conn.router.register(topic, handler),
            Protocol::Raw => conn.router.replace_sole(topic, handler),
        };

        if conn.state() == ConnectionState::Connected {
            tracing::info!(
                connection = %id,
                topic = %topic,
                "Subscription added to live connection, takes effect on next start"
            );
        }
        Ok(subscription_id)
    }

    /// Open the socket, run the handshake and start the listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for an unknown id, or
    /// [`RegistryError::Transport`] if connecting or the handshake fails.
    pub async fn start(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.get(id)?;
        let mut link = conn.link.lock().await;

        if link.is_some() && conn.state() == ConnectionState::Connected {
            tracing::debug!(connection = %id, "Already connected");
            return Ok(());
        }

        // The peer may have hung up since the last start.
        if let Some(stale) = link.take() {
            Self::close_link(&conn, stale).await;
        }

        conn.set_state(ConnectionState::Connecting);
        tracing::info!(connection = %id, url = %conn.url, "Connecting");

        match self.open(&conn).await {
            Ok(live) => {
                *link = Some(live);
                tracing::info!(connection = %id, "Connected");
                Ok(())
            }
            Err(source) => {
                conn.set_state(ConnectionState::Disconnected);
                tracing::warn!(connection = %id, error = %source, "Connection failed");
                Err(RegistryError::Transport {
                    id: id.to_string(),
                    source,
                })
            }
        }
    }

    /// Start every connection in id order. Returns the ids that failed.
    pub async fn start_all(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for id in self.connection_ids() {
            if let Err(e) = self.start(&id).await {
                tracing::error!(connection = %id, error = %e, "Failed to start connection");
                failed.push(id);
            }
        }
        failed
    }

    /// Start with backoff between failed attempts.
    ///
    /// The policy is reset on success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] immediately for an unknown
    /// id, or [`RegistryError::RetriesExhausted`] once `policy` gives up.
    pub async fn start_with_retry(
        &self,
        id: &str,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), RegistryError> {
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match self.start(id).await {
                Ok(()) => {
                    policy.reset();
                    return Ok(());
                }
                Err(e @ RegistryError::UnknownConnection(_)) => return Err(e),
                Err(e) => {
                    let Some(delay) = policy.next_delay() else {
                        tracing::error!(connection = %id, attempts, error = %e, "Giving up on connection");
                        return Err(RegistryError::RetriesExhausted {
                            id: id.to_string(),
                            attempts,
                        });
                    };
                    tracing::info!(
                        connection = %id,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Retrying connection"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Send a raw text payload.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotConnected`] without an open socket, or
    /// [`RegistryError::Transport`] if the write fails.
    pub async fn send(&self, id: &str, text: &str) -> Result<(), RegistryError> {
        let conn = self.get(id)?;
        let mut link = conn.link.lock().await;
        let live = match link.as_mut() {
            Some(live) if conn.state() == ConnectionState::Connected => live,
            _ => return Err(RegistryError::NotConnected(id.to_string())),
        };
        live.writer
            .send_text(text.to_string())
            .await
            .map_err(|source| RegistryError::Transport {
                id: id.to_string(),
                source,
            })
    }

    /// Stop the listener and close the socket.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for an unknown id.
    pub async fn disconnect(&self, id: &str) -> Result<(), RegistryError> {
        let conn = self.get(id)?;
        Self::teardown(&conn).await;
        Ok(())
    }

    /// Disconnect every connection.
    pub async fn disconnect_all(&self) {
        let connections: Vec<_> = self.connections.read().values().cloned().collect();
        for conn in connections {
            Self::teardown(&conn).await;
        }
    }

    /// Current state of a connection.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<ConnectionState> {
        self.get(id).ok().map(|c| c.state())
    }

    /// Whether a connection is up.
    #[must_use]
    pub fn is_connected(&self, id: &str) -> bool {
        self.state(id) == Some(ConnectionState::Connected)
    }

    /// Receiver that observes state transitions.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for an unknown id.
    pub fn watch_state(&self, id: &str) -> Result<watch::Receiver<ConnectionState>, RegistryError> {
        Ok(self.get(id)?.state.subscribe())
    }

    /// Registered ids in order.
    #[must_use]
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// `(topic, subscription id)` pairs in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] for an unknown id.
    pub fn subscriptions(&self, id: &str) -> Result<Vec<(String, String)>, RegistryError> {
        Ok(self.get(id)?.router.subscriptions())
    }

    fn get(&self, id: &str) -> Result<Arc<Connection>, RegistryError> {
        self.connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownConnection(id.to_string()))
    }

    async fn open(&self, conn: &Arc<Connection>) -> Result<LiveLink, TransportError> {
        let Socket {
            mut writer,
            inbound,
        } = self.transport.connect(&conn.url).await?;

        if conn.protocol == Protocol::Framed
            && let Err(e) = self.handshake(conn, writer.as_mut()).await
        {
            let _ = writer.close().await;
            return Err(e);
        }

        conn.set_state(ConnectionState::Connected);

        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(
            Arc::clone(conn),
            self.codec,
            inbound,
            cancel.clone(),
        ));

        Ok(LiveLink {
            writer,
            cancel,
            listener,
        })
    }

    async fn handshake(
        &self,
        conn: &Connection,
        writer: &mut dyn SocketWriter,
    ) -> Result<(), TransportError> {
        writer.send_text(self.codec.encode_connect()).await?;
        for (topic, subscription_id) in conn.router.subscriptions() {
            writer
                .send_text(self.codec.encode_subscribe(&topic, &subscription_id))
                .await?;
            tracing::debug!(connection = %conn.id, topic = %topic, id = %subscription_id, "Subscribed");
        }
        Ok(())
    }

    async fn teardown(conn: &Connection) {
        let live = conn.link.lock().await.take();
        if let Some(live) = live {
            Self::close_link(conn, live).await;
            tracing::info!(connection = %conn.id, "Disconnected");
        }
        conn.set_state(ConnectionState::Disconnected);
    }

    async fn close_link(conn: &Connection, mut live: LiveLink) {
        live.cancel.cancel();
        if let Err(e) = live.writer.close().await {
            tracing::debug!(connection = %conn.id, error = %e, "Socket close failed");
        }
        if let Err(e) = live.listener.await {
            tracing::warn!(connection = %conn.id, error = %e, "Listener task failed");
        }
    }
}

async fn listen(
    conn: Arc<Connection>,
    codec: FrameCodec,
    mut inbound: InboundStream,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(connection = %conn.id, "Listener cancelled");
                return;
            }
            next = inbound.next() => match next {
                Some(Ok(text)) => conn.handle_payload(&codec, &text),
                Some(Err(e)) => {
                    tracing::warn!(connection = %conn.id, error = %e, "Transport error, connection lost");
                    break;
                }
                None => {
                    tracing::info!(connection = %conn.id, "Peer closed connection");
                    break;
                }
            },
        }
    }
    conn.set_state(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::MemoryTransport;

    fn registry() -> (Arc<MemoryTransport>, ConnectionRegistry) {
        let transport = Arc::new(MemoryTransport::new());
        let registry = ConnectionRegistry::new(transport.clone());
        (transport, registry)
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (_, registry) = registry();
        registry.add_connection("chat", "mem://chat", Protocol::Framed).unwrap();
        let err = registry.add_connection("chat", "mem://other", Protocol::Raw).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(ref id) if id == "chat"));
    }

    #[test]
    fn unknown_connection() {
        let (_, registry) = registry();
        let err = registry
            .add_subscription("nope", "/a", Arc::new(|_: &str, _: Value| {}))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownConnection(_)));
        assert_eq!(registry.state("nope"), None);
        assert!(!registry.is_connected("nope"));
    }

    #[test]
    fn connection_ids_are_sorted() {
        let (_, registry) = registry();
        registry.add_connection("orders", "mem://o", Protocol::Raw).unwrap();
        registry.add_connection("chat", "mem://c", Protocol::Framed).unwrap();
        assert_eq!(registry.connection_ids(), vec!["chat", "orders"]);
    }

    #[tokio::test]
    async fn start_failure_marks_disconnected() {
        let (_, registry) = registry();
        registry.add_connection("chat", "mem://unarmed", Protocol::Framed).unwrap();

        let err = registry.start("chat").await.unwrap_err();
        assert!(matches!(err, RegistryError::Transport { .. }));
        assert_eq!(registry.state("chat"), Some(ConnectionState::Disconnected));
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let (_, registry) = registry();
        registry.add_connection("chat", "mem://chat", Protocol::Framed).unwrap();
        let err = registry.send("chat", "hello").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotConnected(_)));
    }

    #[tokio::test]
    async fn start_is_idempotent_while_connected() {
        let (transport, registry) = registry();
        let mut peer = transport.expect("mem://chat");
        registry.add_connection("chat", "mem://chat", Protocol::Framed).unwrap();

        registry.start("chat").await.unwrap();
        registry.start("chat").await.unwrap();

        assert_eq!(peer.next_sent().await.as_deref(), Some("CONNECT\naccept-version:1.2\n\n\0"));
        assert!(peer.try_next_sent().is_none());
        assert_eq!(transport.connect_count("mem://chat"), 1);
    }
}
