//! Dashboard market-data stream
//!
//! Binary-facing crate for the dashboard's live price feed.
//!
//! ## Architecture
//!
//! - **bin_common**: Shared helpers for binaries (config path, logging)
//! - **marketstream**: Streaming core (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use dashboard_stream::bin_common::{init_tracing, load_stream_config, ConfigType};
//! use dashboard_stream::marketstream::MarketDataService;
//! ```

// Re-export workspace libraries for convenience
pub use marketstream;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;

    pub use cli::{load_config_from_env, load_stream_config, parse_args, ConfigType};
    pub use logging::init_tracing;
}
