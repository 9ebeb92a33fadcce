//! Tracing initialization (spec §9 Open Question: collapses the source's
//! two diverged logging backends into a single structured-logger façade).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ConciergeError, Result};

/// Initialize the global tracing subscriber.
///
/// Filtering is controlled by the standard `RUST_LOG` environment variable
/// (falling back to `info`). Output format is controlled by
/// `RUST_LOG_FORMAT`: `json`, `compact`, or the default `pretty`.
pub fn init() -> Result<()> {
    init_with_default("info")
}

pub fn init_with_default(default_filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let init_result = match format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_ansi(false).json())
            .try_init(),
        "compact" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty())
            .try_init(),
    };

    init_result.map_err(|e| ConciergeError::Internal(format!("failed to initialize tracing: {e}")))
}
