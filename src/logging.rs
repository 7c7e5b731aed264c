//! Structured logging setup using the `tracing` crate.
//!
//! Library code only emits `tracing` events; initialization is opt-in for
//! binaries and tests embedding the engine.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            color: default_true(),
        }
    }
}

/// Initialize the logging system.
///
/// The `LAMINA_LOG` environment variable overrides the configured level and
/// accepts full `EnvFilter` directives.
pub fn init_logging(config: Option<&LoggingConfig>) {
    let filter = EnvFilter::try_from_env("LAMINA_LOG").unwrap_or_else(|_| {
        let level = config.map(|c| c.level.as_str()).unwrap_or("info");
        EnvFilter::new(level)
    });

    let format = config.map(|c| c.format.as_str()).unwrap_or("text");
    let use_color = config.map(|c| c.color).unwrap_or(true);

    let base = Registry::default().with(filter);
    if format == "json" {
        base.with(fmt::layer().json().with_target(true)).init();
    } else {
        base.with(fmt::layer().with_target(true).with_ansi(use_color))
            .init();
    }
}
