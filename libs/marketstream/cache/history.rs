use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Bounded, chronological price history for one symbol
///
/// `prices` and `timestamps` always have the same length, never more than
/// `max_length`. Once full, each push evicts the oldest entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    symbol: String,
    prices: VecDeque<f64>,
    timestamps: VecDeque<DateTime<Utc>>,
    max_length: usize,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>, max_length: usize) -> Self {
        let max_length = max_length.max(1);
        Self {
            symbol: symbol.into(),
            prices: VecDeque::with_capacity(max_length.min(1024)),
            timestamps: VecDeque::with_capacity(max_length.min(1024)),
            max_length,
        }
    }

    /// Append an entry, evicting the oldest once over capacity
    ///
    /// A timestamp older than the newest retained one is clamped to it so
    /// the sequence stays chronological.
    pub(crate) fn push(&mut self, price: f64, timestamp: DateTime<Utc>) {
        let timestamp = match self.timestamps.back() {
            Some(&last) if timestamp < last => last,
            _ => timestamp,
        };

        self.prices.push_back(price);
        self.timestamps.push_back(timestamp);

        while self.prices.len() > self.max_length {
            self.prices.pop_front();
            self.timestamps.pop_front();
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn prices(&self) -> &VecDeque<f64> {
        &self.prices
    }

    pub fn timestamps(&self) -> &VecDeque<DateTime<Utc>> {
        &self.timestamps
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<(f64, DateTime<Utc>)> {
        Some((*self.prices.back()?, *self.timestamps.back()?))
    }
}
