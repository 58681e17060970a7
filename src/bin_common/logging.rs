//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing, honouring `RUST_LOG` when it is set
///
/// `default_directive` applies otherwise, e.g. `"info"` or
/// `"info,marketstream=debug"`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}
