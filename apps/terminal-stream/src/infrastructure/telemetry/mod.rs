//! Logging Setup
//!
//! Installs a `tracing-subscriber` registry with an env filter and a fmt
//! layer.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: extra filter directives (default adds `terminal_stream=info`)
//! - `TERMINAL_LOG_FORMAT`: `compact` for single-line compact output
//!
//! # Usage
//!
//! ```ignore
//! use terminal_stream::infrastructure::telemetry;
//!
//! let _guard = telemetry::init();
//! tracing::info!("Ready");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default crate directive.
const DEFAULT_DIRECTIVE: &str = "terminal_stream=info";

/// Output style for the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-field full output.
    #[default]
    Full,
    /// Compact single-line output.
    Compact,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Output style.
    pub format: LogFormat,
    /// Include the event target (module path).
    pub with_target: bool,
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let format = match std::env::var("TERMINAL_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            _ => LogFormat::Full,
        };
        Self {
            format,
            with_target: true,
        }
    }
}

/// Keeps logging alive for the life of the program.
///
/// Flushes nothing today; held so callers do not change when a buffered
/// writer is introduced.
#[derive(Debug)]
pub struct TelemetryGuard {
    _private: (),
}

/// Initialize logging from the environment.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(&TelemetryConfig::from_env())
}

/// Initialize logging with explicit configuration.
///
/// Later calls are ignored if a global subscriber is already set.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init_with_config(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_DIRECTIVE
            .parse()
            .expect("static directive 'terminal_stream=info' is valid"),
    );

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Full => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(config.with_target)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.with_target),
            )
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }

    TelemetryGuard { _private: () }
}
