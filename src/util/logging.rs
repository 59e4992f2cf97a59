//! Logging setup
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the application.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Environment variable that turns on debug logging
pub const DEBUG_ENV: &str = "RANGETRACE_DEBUG";

/// Initialize the tracing system
///
/// This function sets up tracing with an `EnvFilter` that:
/// - Honors the `RUST_LOG` environment variable if set
/// - Logs at debug level when `RANGETRACE_DEBUG` is set
/// - Only logs warnings and errors otherwise
///
/// Logs go to stderr. Calling it more than once has no effect.
pub fn init_logging() {
	INIT.call_once(|| {
		let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive()));

		// another subscriber may already be installed by the embedding program
		let _ = tracing_subscriber::registry()
			.with(fmt::layer().with_target(true).with_writer(std::io::stderr))
			.with(filter)
			.try_init();
	});
}

fn default_directive() -> &'static str {
	if std::env::var_os(DEBUG_ENV).is_some() { "rangetrace=debug" } else { "rangetrace=warn" }
}

/// Get the current log level as a string
///
/// One of "trace", "debug", "info", "warn", "error" or "off".
#[must_use]
pub fn log_level() -> &'static str {
	if tracing::level_enabled!(tracing::Level::TRACE) {
		"trace"
	} else if tracing::level_enabled!(tracing::Level::DEBUG) {
		"debug"
	} else if tracing::level_enabled!(tracing::Level::INFO) {
		"info"
	} else if tracing::level_enabled!(tracing::Level::WARN) {
		"warn"
	} else if tracing::level_enabled!(tracing::Level::ERROR) {
		"error"
	} else {
		"off"
	}
}
