//! Structured logging infrastructure for CloudControl.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that switches the node to JSON log output.
pub const JSON_LOG_ENV: &str = "CLOUDCONTROL_LOG_JSON";

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system with human-readable output.
///
/// Log level can be configured via the `RUST_LOG` environment variable.
/// If not set, defaults to `info` level.
///
/// # Example
/// ```no_run
/// use cloudcontrol_core::logging;
///
/// logging::init();
/// tracing::info!("Node started");
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output for log aggregation.
///
/// # Example
/// ```no_run
/// use cloudcontrol_core::logging;
///
/// logging::init_json();
/// tracing::info!(service = "cloudcontrol-node", "Node started");
/// ```
pub fn init_json() {
    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Pick the output format from [`JSON_LOG_ENV`] and initialize logging.
pub fn init_from_env() {
    if json_requested(std::env::var(JSON_LOG_ENV).ok().as_deref()) {
        init_json();
    } else {
        init();
    }
}

fn json_requested(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}
