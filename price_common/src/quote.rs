//! Price data model and JSON encoding helpers.
//!
//! A `PriceQuote` is the event the feed hands to the broadcast engine: symbol,
//! new price and the moment it was produced. A `PriceSnapshot` is the response
//! shape of the pull-based snapshot query. Both carry timestamps as fractional
//! seconds since the Unix epoch.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::protocol::ServerMessage;
use crate::symbol::Symbol;

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Round a price to two decimal places for display on the wire.
pub fn round_price(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Immutable price event for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Instrument the price belongs to.
    pub symbol: Symbol,
    /// Unrounded price as produced by the feed.
    pub price: f64,
    /// Production time, seconds since the Unix epoch.
    pub timestamp: f64,
}

impl PriceQuote {
    /// Build a quote stamped with the current time.
    pub fn new(symbol: Symbol, price: f64) -> Self {
        Self {
            symbol,
            price,
            timestamp: now_timestamp(),
        }
    }

    /// Build a quote with an explicit timestamp.
    pub fn at(symbol: Symbol, price: f64, timestamp: f64) -> Self {
        Self {
            symbol,
            price,
            timestamp,
        }
    }

    /// Outbound `price` frame for this quote, price rounded to two decimals.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Price {
            symbol: self.symbol.clone(),
            price: round_price(self.price),
            timestamp: self.timestamp,
        }
    }
}

/// Response body of the snapshot query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Normalized symbol that was queried.
    pub symbol: Symbol,
    /// Latest known price, rounded to two decimals.
    pub price: f64,
    /// Time the snapshot was taken, seconds since the Unix epoch.
    pub timestamp: f64,
}
