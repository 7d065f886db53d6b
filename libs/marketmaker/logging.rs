//! Logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing with standard configuration (defaults to info level).
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Initialize tracing with a specific log level.
///
/// The level can be: error, warn, info, debug, trace.
/// RUST_LOG overrides the configured level when set.
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("marketmaker={level},{level}", level = level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(false)
        .init();
}
