//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when nothing is configured.
pub const DEFAULT_FILTER: &str = "ssh_sandbox=info";

/// Initialize the logging system with a configured level.
///
/// A bare level such as `debug` applies to this crate only; anything else
/// is used as a full filter directive.
pub fn init_with_level(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter_directive(level)))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

/// Expand a configured level into a filter directive.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim();
    match level.to_ascii_lowercase().as_str() {
        "" => DEFAULT_FILTER.to_string(),
        "error" | "warn" | "info" | "debug" | "trace" | "off" => {
            format!("ssh_sandbox={}", level.to_ascii_lowercase())
        }
        _ => level.to_string(),
    }
}
