use crate::codec::MarketEvent;
use crate::subscription::normalize_symbol;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Immutable point-in-time price record for one symbol
///
/// Every update builds a new snapshot from the previous one plus a single
/// market event; snapshots are never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub symbol: String,
    /// Display price: quote midpoint, or the trade price for trade updates
    pub price: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_trade_price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PriceSnapshot {
    /// Fold `event` onto the previous snapshot for the same symbol
    ///
    /// Quotes carry the last trade forward; trades carry bid/ask forward.
    /// Returns `None` for an event without a symbol, and for a first quote
    /// with no positive side, since there is no price to show yet.
    pub fn from_event(previous: Option<&PriceSnapshot>, event: &MarketEvent) -> Option<Self> {
        let symbol = normalize_symbol(event.symbol());
        if symbol.is_empty() {
            return None;
        }

        match *event {
            MarketEvent::Quote { bid, ask, timestamp, .. } => {
                let price = if bid > 0.0 && ask > 0.0 {
                    (bid + ask) / 2.0
                } else if let Some(previous) = previous {
                    previous.price
                } else if bid.max(ask) > 0.0 {
                    bid.max(ask)
                } else {
                    return None;
                };
                Some(Self {
                    symbol,
                    price,
                    bid: Some(bid),
                    ask: Some(ask),
                    last_trade_price: previous.and_then(|p| p.last_trade_price),
                    timestamp,
                })
            }
            MarketEvent::Trade { price, timestamp, .. } => Some(Self {
                symbol,
                price,
                bid: previous.and_then(|p| p.bid),
                ask: previous.and_then(|p| p.ask),
                last_trade_price: Some(price),
                timestamp,
            }),
        }
    }

    /// Bid/ask spread, when both sides are known
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }
}
