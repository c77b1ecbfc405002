#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Terminal Stream - Trading Terminal Streaming Client
//!
//! Maintains the terminal's long-lived socket connections, multiplexes
//! topic subscriptions onto them, and folds order lifecycle events into an
//! active/historical ledger for the view layer.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Order model and payload classification
//!   - `order`: Order records, statuses and the reconciliation ledger
//!   - `payload`: Typed decoding of stream payloads
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, topic handler and order gateway interfaces
//!   - `services`: Order reconciler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Frame codec, subscription router, connection registry
//!   - `transport`: WebSocket and in-memory transports
//!   - `http`: Order API client
//!   - `config`: Environment configuration
//!   - `telemetry`: Logging setup
//!
//! # Data Flow
//!
//! ```text
//! chat WS (framed) ──┐                 ┌─► codec ─► router ─► chat handler
//!                    ├─► registry ─────┤
//! orders WS (raw) ───┘                 └─► JSON ──► sole handler ─► reconciler
//!                                                                     ▲
//! order API (HTTP) ─── bootstrap / submit / cancel / strategy ────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::order::{
    HistoryQuery, LedgerOutcome, Order, OrderLedger, OrderRequest, OrderStatus, PendingOrder,
    PopulateSummary, Side, StrategyRequest,
};
pub use domain::payload::{ChatMessage, PayloadError, StreamPayload};

// Ports
pub use application::ports::{
    GatewayError, OrderGateway, Socket, SocketWriter, TopicHandler, Transport, TransportError,
};

// Services
pub use application::services::{LedgerSnapshot, OrderReconciler};

// Streaming
pub use infrastructure::stream::{
    ConnectionRegistry, ConnectionState, Decoded, FrameCodec, FrameError, Protocol,
    ReconnectConfig, ReconnectPolicy, RegistryError, SubscriptionRouter,
};

// Transports
pub use infrastructure::transport::{MemoryPeer, MemoryTransport, WebSocketTransport};

// HTTP
pub use infrastructure::http::HttpOrderGateway;

// Config
pub use infrastructure::config::{ConfigError, TerminalConfig};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
