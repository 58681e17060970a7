//! Symbol subscription bookkeeping

pub mod registry;

pub use registry::{normalize_symbol, SubscriptionRegistry};
