//! Latest snapshot and bounded history per symbol

use super::{PriceHistory, PriceSnapshot};
use crate::config::DEFAULT_HISTORY_LENGTH;
use crate::subscription::normalize_symbol;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct CacheInner {
    latest: HashMap<String, PriceSnapshot>,
    history: HashMap<String, PriceHistory>,
}

/// Per-symbol price cache
///
/// Readers always get owned copies; nothing handed out aliases the maps.
#[derive(Debug)]
pub struct PriceCache {
    inner: RwLock<CacheInner>,
    history_length: usize,
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LENGTH)
    }
}

impl PriceCache {
    pub fn new(history_length: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            history_length: history_length.max(1),
        }
    }

    /// Latest snapshot for `symbol`, if any update has arrived
    pub fn get_price(&self, symbol: &str) -> Option<PriceSnapshot> {
        self.inner.read().latest.get(&normalize_symbol(symbol)).cloned()
    }

    /// Copy of every latest snapshot, keyed by canonical symbol
    pub fn get_all_prices(&self) -> HashMap<String, PriceSnapshot> {
        self.inner.read().latest.clone()
    }

    /// Copy of the bounded history for `symbol`
    pub fn get_price_history(&self, symbol: &str) -> Option<PriceHistory> {
        self.inner.read().history.get(&normalize_symbol(symbol)).cloned()
    }

    /// Replace the latest snapshot and append it to the symbol's history
    pub(crate) fn apply_update(&self, snapshot: PriceSnapshot) {
        let mut inner = self.inner.write();
        let history_length = self.history_length;

        inner
            .history
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| PriceHistory::new(snapshot.symbol.clone(), history_length))
            .push(snapshot.price, snapshot.timestamp);
        inner.latest.insert(snapshot.symbol.clone(), snapshot);
    }

    /// Number of symbols with at least one update
    pub fn symbol_count(&self) -> usize {
        self.inner.read().latest.len()
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }
}
