//! Price cache: latest snapshot plus bounded history per symbol

pub mod history;
pub mod price_cache;
pub mod snapshot;

pub use history::PriceHistory;
pub use price_cache::PriceCache;
pub use snapshot::PriceSnapshot;
