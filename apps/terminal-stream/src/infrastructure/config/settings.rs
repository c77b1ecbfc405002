//! Terminal Configuration Settings
//!
//! Configuration types for the streaming client, loaded from environment
//! variables. Every value has a default pointing at a local development
//! server.

use std::str::FromStr;
use std::time::Duration;

/// Default framed chat endpoint.
pub const DEFAULT_CHAT_WS_URL: &str = "ws://localhost:8080/connect/chat";
/// Default chat topic.
pub const DEFAULT_CHAT_TOPIC: &str = "/subscribe/chat/messages/user1";
/// Default raw order-update endpoint.
pub const DEFAULT_ORDERS_WS_URL: &str = "ws://localhost:8080/connect/orders";
/// Default order API root.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/";

/// Socket endpoints and topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Framed chat endpoint.
    pub chat_ws_url: String,
    /// Chat topic subscribed on the framed endpoint.
    pub chat_topic: String,
    /// Raw order-update endpoint.
    pub orders_ws_url: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chat_ws_url: DEFAULT_CHAT_WS_URL.to_string(),
            chat_topic: DEFAULT_CHAT_TOPIC.to_string(),
            orders_ws_url: DEFAULT_ORDERS_WS_URL.to_string(),
        }
    }
}

/// Order API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    /// API root, with trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Order ledger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    /// How long an unconfirmed order stays pending.
    pub pending_ttl: Duration,
    /// Days of history fetched at startup.
    pub history_days: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::from_secs(30),
            history_days: 7,
        }
    }
}

/// Reconnection backoff settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Backoff multiplier.
    pub delay_multiplier: f64,
    /// Attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TerminalConfig {
    /// Socket endpoints.
    pub stream: StreamSettings,
    /// Order API.
    pub api: ApiSettings,
    /// Ledger behavior.
    pub ledger: LedgerSettings,
    /// Reconnection backoff.
    pub reconnect: ReconnectSettings,
}

impl TerminalConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL variable has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL variable has the wrong scheme.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let defaults = Self::default();

        let stream = StreamSettings {
            chat_ws_url: env.url(
                "TERMINAL_CHAT_WS_URL",
                &defaults.stream.chat_ws_url,
                &["ws://", "wss://"],
            )?,
            chat_topic: env.string("TERMINAL_CHAT_TOPIC", &defaults.stream.chat_topic),
            orders_ws_url: env.url(
                "TERMINAL_ORDERS_WS_URL",
                &defaults.stream.orders_ws_url,
                &["ws://", "wss://"],
            )?,
        };

        let mut base_url = env.url(
            "TERMINAL_API_BASE_URL",
            &defaults.api.base_url,
            &["http://", "https://"],
        )?;
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let api = ApiSettings {
            base_url,
            timeout: Duration::from_secs(env.parse("TERMINAL_HTTP_TIMEOUT_SECS", 10)),
        };

        let ledger = LedgerSettings {
            pending_ttl: Duration::from_secs(env.parse("TERMINAL_PENDING_TTL_SECS", 30)),
            history_days: env.parse("TERMINAL_HISTORY_DAYS", defaults.ledger.history_days),
        };

        let reconnect = ReconnectSettings {
            delay_initial: Duration::from_millis(env.parse("TERMINAL_RECONNECT_DELAY_INITIAL_MS", 500)),
            delay_max: Duration::from_secs(env.parse("TERMINAL_RECONNECT_DELAY_MAX_SECS", 30)),
            delay_multiplier: env.parse(
                "TERMINAL_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect.delay_multiplier,
            ),
            max_attempts: env.parse(
                "TERMINAL_MAX_RECONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
        };

        Ok(Self {
            stream,
            api,
            ledger,
            reconnect,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// URL variable has an unsupported scheme.
    #[error("{key} must start with one of {expected:?}, got '{value}'")]
    InvalidUrl {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Accepted schemes.
        expected: Vec<&'static str>,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn url(&self, key: &str, default: &str, schemes: &[&'static str]) -> Result<String, ConfigError> {
        let value = self.string(key, default);
        if schemes.iter().any(|s| value.starts_with(s)) {
            Ok(value)
        } else {
            Err(ConfigError::InvalidUrl {
                key: key.to_string(),
                value,
                expected: schemes.to_vec(),
            })
        }
    }
}
