//! Process-wide log sink setup.
//!
//! The supervisor only emits `tracing` events; installing a subscriber is the
//! binary's decision. [`init`] wires a `tracing-subscriber` formatter from a
//! [`LogConfig`].

use tracing::debug;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Install the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` directives are honored on top of the configured level.
///
/// # Errors
///
/// Returns a configuration error if a global subscriber is already installed,
/// or if JSON output is requested without the `json-logs` feature.
pub fn init(config: &LogConfig) -> Result<()> {
    let level: tracing::Level = config.level.into();
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_names(true);

    if config.json {
        #[cfg(feature = "json-logs")]
        {
            let subscriber = builder
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber).map_err(|e| {
                Error::config(format!("Failed to initialize JSON logging: {e}"))
            })?;
            debug!(level = ?config.level, "JSON logging initialized");
            return Ok(());
        }

        #[cfg(not(feature = "json-logs"))]
        {
            return Err(Error::config(
                "JSON logging requested but the `json-logs` feature is not enabled",
            ));
        }
    }

    let subscriber = builder.with_ansi(config.color).compact().finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::config(format!("Failed to initialize logging: {e}")))?;

    debug!(level = ?config.level, "Logging initialized");
    Ok(())
}
