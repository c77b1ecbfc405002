//! Connection Registry Integration Tests
//!
//! Drives framed and raw connections over the in-memory transport: handshake
//! order, routing, teardown, peer hang-ups and opt-in retry.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};

use terminal_stream::{
    ConnectionRegistry, ConnectionState, MemoryTransport, OrderReconciler, OrderStatus, Protocol,
    ReconnectConfig, ReconnectPolicy, RegistryError, TopicHandler,
};

const CHAT_URL: &str = "mem://chat";
const ORDERS_URL: &str = "mem://orders";
const WAIT: Duration = Duration::from_secs(2);

fn setup() -> (Arc<MemoryTransport>, ConnectionRegistry) {
    let transport = Arc::new(MemoryTransport::new());
    let registry = ConnectionRegistry::new(transport.clone());
    (transport, registry)
}

fn channel_handler() -> (Arc<dyn TopicHandler>, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Arc<dyn TopicHandler> = Arc::new(move |topic: &str, payload: Value| {
        let _ = tx.send((topic.to_string(), payload));
    });
    (handler, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<(String, Value)>) -> (String, Value) {
    timeout(WAIT, rx.recv()).await.expect("handler not invoked").unwrap()
}

async fn wait_for_state(registry: &ConnectionRegistry, id: &str, state: ConnectionState) {
    let mut rx = registry.watch_state(id).unwrap();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .unwrap();
}

fn message(destination: &str, body: &str) -> String {
    format!("MESSAGE\ndestination:{destination}\ncontent-type:application/json\nsubscription:sub-x\n\n{body}\0")
}

fn fast_retry(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy::new(ReconnectConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts,
    })
}

// =============================================================================
// Framed connections
// =============================================================================

#[tokio::test]
async fn framed_start_sends_connect_then_subscribes_in_declaration_order() {
    let (transport, registry) = setup();
    let mut peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();

    let topics = ["/subscribe/chat/messages/user1", "/topic/b", "/topic/a"];
    let ids: Vec<String> = topics
        .iter()
        .map(|t| registry.add_subscription("chat", t, channel_handler().0).unwrap())
        .collect();

    registry.start("chat").await.unwrap();
    assert!(registry.is_connected("chat"));

    assert_eq!(peer.next_sent().await.unwrap(), "CONNECT\naccept-version:1.2\n\n\0");
    for (topic, id) in topics.iter().zip(&ids) {
        assert_eq!(
            peer.next_sent().await.unwrap(),
            format!("SUBSCRIBE\ndestination:{topic}\nid:{id}\nack:auto\n\n\0")
        );
    }
    assert!(peer.try_next_sent().is_none());
}

#[tokio::test]
async fn inbound_frames_route_by_destination_and_skip_connect_ack() {
    let (transport, registry) = setup();
    let peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();

    let (handler_x, mut rx_x) = channel_handler();
    let (handler_y, mut rx_y) = channel_handler();
    registry.add_subscription("chat", "/topic/x", handler_x).unwrap();
    registry.add_subscription("chat", "/topic/y", handler_y).unwrap();
    registry.start("chat").await.unwrap();

    peer.push("CONNECTED\nversion:1.2\n\n\0");
    peer.push("\n");
    peer.push(message("/topic/nobody", "{\"lost\":true}"));
    peer.push(message("/topic/x", "{\"a\":1}"));
    peer.push(message("/topic/y", "{\"content\":\"hi\"}"));

    assert_eq!(recv(&mut rx_x).await, ("/topic/x".to_string(), json!({"a": 1})));
    assert_eq!(recv(&mut rx_y).await, ("/topic/y".to_string(), json!({"content": "hi"})));
    assert!(rx_x.try_recv().is_err());
}

#[tokio::test]
async fn malformed_payloads_do_not_stop_the_listener() {
    let (transport, registry) = setup();
    let peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    let (handler, mut rx) = channel_handler();
    registry.add_subscription("chat", "/topic/x", handler).unwrap();
    registry.start("chat").await.unwrap();

    peer.push(message("/topic/x", "{not json"));
    peer.push("MESSAGE\nsubscription:sub-x\n\n{}\0");
    peer.push("ERROR\nmessage:malformed frame received\n\n\0");
    peer.push(message("/topic/x", "{\"ok\":true}"));

    assert_eq!(recv(&mut rx).await.1, json!({"ok": true}));
    assert!(registry.is_connected("chat"));
}

#[tokio::test]
async fn subscriptions_added_after_start_are_routed_but_not_sent() {
    let (transport, registry) = setup();
    let mut peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.start("chat").await.unwrap();
    assert_eq!(peer.drain_sent().len(), 1);

    let (handler, mut rx) = channel_handler();
    registry.add_subscription("chat", "/topic/late", handler).unwrap();
    assert!(peer.try_next_sent().is_none());

    peer.push(message("/topic/late", "[1,2]"));
    assert_eq!(recv(&mut rx).await.1, json!([1, 2]));
}

// =============================================================================
// Raw connections
// =============================================================================

#[tokio::test]
async fn raw_connection_sends_no_frames_and_feeds_the_reconciler() {
    let (transport, registry) = setup();
    let mut peer = transport.expect(ORDERS_URL);
    let reconciler = Arc::new(OrderReconciler::default());
    let mut revisions = reconciler.subscribe();

    registry.add_connection("orders", ORDERS_URL, Protocol::Raw).unwrap();
    registry
        .add_subscription("orders", "orders", Arc::clone(&reconciler) as Arc<dyn TopicHandler>)
        .unwrap();
    registry.start("orders").await.unwrap();

    peer.push(r#"{"id":1,"status":"SUBMITTING","qty":100}"#);
    peer.push("not json at all");
    peer.push(r#"{"id":1,"status":"FILLED_PART","dealt_qty":40}"#);
    peer.push(r#"{"id":1,"status":"FILLED_ALL","dealt_qty":100}"#);

    timeout(WAIT, revisions.wait_for(|r| *r >= 3)).await.unwrap().unwrap();

    assert!(peer.drain_sent().is_empty());
    assert!(reconciler.active().is_empty());
    let historical = reconciler.historical();
    assert_eq!(historical.len(), 1);
    assert_eq!(historical[0].order_id, "1");
    assert_eq!(historical[0].order_status, OrderStatus::FilledAll);
}

#[tokio::test]
async fn raw_connection_routes_everything_to_its_single_handler() {
    let (transport, registry) = setup();
    let peer = transport.expect(ORDERS_URL);
    registry.add_connection("orders", ORDERS_URL, Protocol::Raw).unwrap();

    let (first, mut first_rx) = channel_handler();
    let (second, mut second_rx) = channel_handler();
    registry.add_subscription("orders", "orders", first).unwrap();
    registry.add_subscription("orders", "other", second).unwrap();
    assert_eq!(registry.subscriptions("orders").unwrap().len(), 1);

    registry.start("orders").await.unwrap();
    peer.push(r#"{"content":"not an order"}"#);
    peer.push("42");

    assert_eq!(recv(&mut second_rx).await.1, json!({"content": "not an order"}));
    assert_eq!(recv(&mut second_rx).await.1, json!(42));
    assert!(first_rx.try_recv().is_err());
}

#[tokio::test]
async fn framed_and_raw_connections_coexist() {
    let (transport, registry) = setup();
    let chat_peer = transport.expect(CHAT_URL);
    let orders_peer = transport.expect(ORDERS_URL);

    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.add_connection("orders", ORDERS_URL, Protocol::Raw).unwrap();
    let (chat, mut chat_rx) = channel_handler();
    let (orders, mut orders_rx) = channel_handler();
    registry.add_subscription("chat", "/topic/chat", chat).unwrap();
    registry.add_subscription("orders", "orders", orders).unwrap();

    assert!(registry.start_all().await.is_empty());

    chat_peer.push(message("/topic/chat", "{\"content\":\"hello\"}"));
    orders_peer.push(r#"{"order_id":"9","order_status":"SUBMITTED"}"#);

    assert_eq!(recv(&mut chat_rx).await.0, "/topic/chat");
    assert_eq!(recv(&mut orders_rx).await.0, "orders");
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn disconnect_closes_socket_and_flips_state() {
    let (transport, registry) = setup();
    let peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.start("chat").await.unwrap();

    registry.send("chat", "SEND\ndestination:/app/chat\n\n{}\0").await.unwrap();
    registry.disconnect("chat").await.unwrap();

    assert!(peer.client_closed());
    assert_eq!(registry.state("chat"), Some(ConnectionState::Disconnected));
    assert!(matches!(
        registry.send("chat", "late").await,
        Err(RegistryError::NotConnected(_))
    ));
}

#[tokio::test]
async fn peer_hang_up_flips_state_and_restart_opens_fresh_socket() {
    let (transport, registry) = setup();
    let mut first_peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.add_subscription("chat", "/topic/x", channel_handler().0).unwrap();
    registry.start("chat").await.unwrap();

    first_peer.hang_up();
    wait_for_state(&registry, "chat", ConnectionState::Disconnected).await;

    let mut second_peer = transport.expect(CHAT_URL);
    registry.start("chat").await.unwrap();
    assert!(registry.is_connected("chat"));
    assert_eq!(second_peer.drain_sent().len(), 2);
    assert_eq!(transport.connect_count(CHAT_URL), 2);
}

#[tokio::test]
async fn remove_connection_disconnects_and_forgets() {
    let (transport, registry) = setup();
    let peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.start("chat").await.unwrap();

    registry.remove_connection("chat").await.unwrap();

    assert!(peer.client_closed());
    assert!(registry.connection_ids().is_empty());
    registry.add_connection("chat", CHAT_URL, Protocol::Raw).unwrap();
}

#[tokio::test]
async fn start_all_reports_failed_ids() {
    let (transport, registry) = setup();
    let _peer = transport.expect(ORDERS_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.add_connection("orders", ORDERS_URL, Protocol::Raw).unwrap();

    assert_eq!(registry.start_all().await, vec!["chat".to_string()]);
    assert!(registry.is_connected("orders"));

    registry.disconnect_all().await;
    assert!(!registry.is_connected("orders"));
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn start_with_retry_recovers_after_refusals() {
    let (transport, registry) = setup();
    transport.refuse(CHAT_URL, 2);
    let mut peer = transport.expect(CHAT_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();

    let mut policy = fast_retry(5);
    registry.start_with_retry("chat", &mut policy).await.unwrap();

    assert!(registry.is_connected("chat"));
    assert_eq!(transport.connect_count(CHAT_URL), 3);
    assert_eq!(policy.attempt_count(), 0);
    assert_eq!(peer.next_sent().await.unwrap(), "CONNECT\naccept-version:1.2\n\n\0");
}

#[tokio::test]
async fn start_with_retry_reports_exhaustion() {
    let (transport, registry) = setup();
    transport.refuse(CHAT_URL, 10);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();

    let err = registry
        .start_with_retry("chat", &mut fast_retry(2))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(registry.state("chat"), Some(ConnectionState::Disconnected));
}

#[tokio::test]
async fn start_with_retry_rejects_unknown_ids_immediately() {
    let (_, registry) = setup();
    let err = registry
        .start_with_retry("missing", &mut fast_retry(3))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::UnknownConnection(_)));
}

#[tokio::test]
async fn concurrent_retries_do_not_hold_back_healthy_connections() {
    let (transport, registry) = setup();
    let _peer = transport.expect(ORDERS_URL);
    registry.add_connection("chat", CHAT_URL, Protocol::Framed).unwrap();
    registry.add_connection("orders", ORDERS_URL, Protocol::Raw).unwrap();

    let mut slow = ReconnectPolicy::new(ReconnectConfig {
        initial_delay: Duration::from_millis(150),
        max_delay: Duration::from_millis(150),
        multiplier: 1.0,
        jitter_factor: 0.0,
        max_attempts: 2,
    });
    let mut fast = fast_retry(2);
    let started = Instant::now();

    let (chat, orders) = tokio::join!(registry.start_with_retry("chat", &mut slow), async {
        let result = registry.start_with_retry("orders", &mut fast).await;
        (result, started.elapsed())
    });

    let (orders, orders_elapsed) = orders;
    orders.unwrap();
    assert!(orders_elapsed < Duration::from_millis(150));
    assert!(matches!(chat, Err(RegistryError::RetriesExhausted { .. })));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(registry.is_connected("orders"));
}
