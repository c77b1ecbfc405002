//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Frame codec, subscription routing and the connection registry.
pub mod stream;

/// WebSocket and in-memory socket transports.
pub mod transport;

/// HTTP order API client.
pub mod http;

/// Configuration loaded from the environment.
pub mod config;

/// Logging setup.
pub mod telemetry;
