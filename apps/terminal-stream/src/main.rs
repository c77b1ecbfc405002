//! Terminal Stream Binary
//!
//! Connects the terminal's chat and order streams, bootstraps the order
//! ledger from history, and logs ledger changes until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin terminal-stream
//! ```
//!
//! # Environment Variables
//!
//! - `TERMINAL_CHAT_WS_URL`: Framed chat endpoint (default: `ws://localhost:8080/connect/chat`)
//! - `TERMINAL_CHAT_TOPIC`: Chat topic (default: `/subscribe/chat/messages/user1`)
//! - `TERMINAL_ORDERS_WS_URL`: Raw order endpoint (default: `ws://localhost:8080/connect/orders`)
//! - `TERMINAL_API_BASE_URL`: Order API root (default: <http://localhost:8080/>)
//! - `TERMINAL_HTTP_TIMEOUT_SECS`: HTTP timeout (default: 10)
//! - `TERMINAL_PENDING_TTL_SECS`: Pending order lifetime (default: 30)
//! - `TERMINAL_HISTORY_DAYS`: History window fetched at startup (default: 7)
//! - `TERMINAL_RECONNECT_*`, `TERMINAL_MAX_RECONNECT_ATTEMPTS`: Connect backoff
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use terminal_stream::application::services::DEFAULT_PENDING_TTL;
use terminal_stream::infrastructure::config::ReconnectSettings;
use terminal_stream::infrastructure::telemetry;
use terminal_stream::{
    ConnectionRegistry, HistoryQuery, HttpOrderGateway, OrderReconciler, Protocol,
    ReconnectConfig, ReconnectPolicy, StreamPayload, TerminalConfig, TopicHandler,
    WebSocketTransport,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

const CHAT_CONNECTION: &str = "chat";
const ORDERS_CONNECTION: &str = "orders";
const ORDERS_TOPIC: &str = "orders";

/// How often expired pending orders are swept.
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    tracing::info!("Starting terminal stream");

    let config = TerminalConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let pending_ttl = chrono::Duration::from_std(config.ledger.pending_ttl).unwrap_or(DEFAULT_PENDING_TTL);
    let reconciler = Arc::new(OrderReconciler::new(pending_ttl));
    let gateway = HttpOrderGateway::new(&config.api.base_url, config.api.timeout)
        .context("failed to build order API client")?;

    let registry = Arc::new(ConnectionRegistry::new(Arc::new(WebSocketTransport::new())));
    registry.add_connection(CHAT_CONNECTION, &config.stream.chat_ws_url, Protocol::Framed)?;
    registry.add_subscription(CHAT_CONNECTION, &config.stream.chat_topic, Arc::new(log_chat))?;
    registry.add_connection(ORDERS_CONNECTION, &config.stream.orders_ws_url, Protocol::Raw)?;
    registry.add_subscription(
        ORDERS_CONNECTION,
        ORDERS_TOPIC,
        Arc::clone(&reconciler) as Arc<dyn TopicHandler>,
    )?;

    let query = HistoryQuery::trailing_days(Utc::now().date_naive(), config.ledger.history_days);
    if let Err(e) = reconciler.bootstrap(&gateway, &query).await {
        tracing::warn!(error = %e, "Order history unavailable, starting with an empty ledger");
    }

    let ids = registry.connection_ids();
    for id in &ids {
        spawn_state_logger(&registry, id, shutdown_token.clone());
    }
    // Started together so one unreachable endpoint does not hold back the rest.
    join_all(ids.iter().map(|id| start_connection(&registry, id, &config.reconnect))).await;

    spawn_pending_sweeper(Arc::clone(&reconciler), shutdown_token.clone());
    spawn_ledger_logger(Arc::clone(&reconciler), shutdown_token.clone());

    tracing::info!("Terminal stream ready");

    await_shutdown(shutdown_token).await;

    registry.disconnect_all().await;
    tracing::info!("Terminal stream stopped");
    Ok(())
}

/// Start one connection with backoff, logging if it never comes up.
async fn start_connection(registry: &ConnectionRegistry, id: &str, settings: &ReconnectSettings) {
    let mut policy = ReconnectPolicy::new(ReconnectConfig::from_settings(settings));
    if let Err(e) = registry.start_with_retry(id, &mut policy).await {
        tracing::error!(connection = %id, error = %e, "Connection unavailable");
    }
}

/// Chat topic handler.
fn log_chat(topic: &str, payload: Value) {
    match StreamPayload::decode(payload) {
        Ok(StreamPayload::ChatMessage(msg)) => {
            tracing::info!(topic = %topic, room = ?msg.room, role = ?msg.role, content = %msg.content, "Chat message");
        }
        Ok(other) => tracing::debug!(topic = %topic, payload = ?other, "Unhandled chat payload"),
        Err(e) => tracing::warn!(topic = %topic, error = %e, "Malformed chat payload"),
    }
}

/// Log connection state transitions.
fn spawn_state_logger(registry: &ConnectionRegistry, id: &str, shutdown: CancellationToken) {
    let Ok(mut rx) = registry.watch_state(id) else {
        return;
    };
    let id = id.to_string();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let state = *rx.borrow_and_update();
                    tracing::info!(connection = %id, ?state, "Connection state changed");
                }
            }
        }
    });
}

/// Periodically discard pending orders that were never confirmed.
fn spawn_pending_sweeper(reconciler: Arc<OrderReconciler>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PENDING_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let _ = reconciler.expire_pending(Utc::now());
                }
            }
        }
    });
}

/// Log ledger sizes whenever the ledger changes.
fn spawn_ledger_logger(reconciler: Arc<OrderReconciler>, shutdown: CancellationToken) {
    let mut rx = reconciler.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let revision = *rx.borrow_and_update();
                    let snapshot = reconciler.snapshot();
                    tracing::info!(
                        revision,
                        active = snapshot.active.len(),
                        historical = snapshot.historical.len(),
                        pending = snapshot.pending.len(),
                        "Ledger updated"
                    );
                }
            }
        }
    });
}

/// Log the parsed configuration.
fn log_config(config: &TerminalConfig) {
    tracing::info!(
        chat_ws_url = %config.stream.chat_ws_url,
        chat_topic = %config.stream.chat_topic,
        orders_ws_url = %config.stream.orders_ws_url,
        api_base_url = %config.api.base_url,
        "Configuration loaded"
    );
    tracing::debug!(
        pending_ttl_secs = config.ledger.pending_ttl.as_secs(),
        history_days = config.ledger.history_days,
        max_reconnect_attempts = config.reconnect.max_attempts,
        "Ledger and reconnect settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
