//! Process-wide log output.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::error::RemedyError;

/// Builds the filter: `RUST_LOG` when set, `default_filter` otherwise.
fn build_filter(env_value: Option<String>, default_filter: &str) -> Result<EnvFilter, RemedyError> {
    let directives = env_value
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_filter.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| RemedyError::Logging(format!("invalid filter '{}': {}", directives, e)))
}

/// Installs the global subscriber and routes `log` records through it.
///
/// Returns `Ok(false)` if logging was already set up by an earlier call.
pub fn init(default_filter: &str, json: bool) -> Result<bool, RemedyError> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), default_filter)?;

    if tracing_log::LogTracer::init().is_err() {
        return Ok(false);
    }

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
    };

    Ok(installed.is_ok())
}
