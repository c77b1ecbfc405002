//! Configuration Module
//!
//! Environment-driven configuration for the streaming client.

mod settings;

pub use settings::{
    ApiSettings, ConfigError, LedgerSettings, ReconnectSettings, StreamSettings, TerminalConfig,
    DEFAULT_API_BASE_URL, DEFAULT_CHAT_TOPIC, DEFAULT_CHAT_WS_URL, DEFAULT_ORDERS_WS_URL,
};
