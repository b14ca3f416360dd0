//! Last-known-value price store.
//!
//! `PriceStore` keeps the latest price per `Symbol` behind an `RwLock`. Writes are
//! last-write-wins; a read always sees a whole `f64` written by some earlier
//! `set`. No history is retained.

use std::collections::HashMap;
use std::sync::RwLock;

use price_common::quote::{now_timestamp, round_price};
use price_common::{PriceSnapshot, Result, Symbol};

/// Price reported for symbols the store has never seen.
pub const BASELINE_PRICE: f64 = 100.0;

/// Initial demo prices loaded by [`PriceStore::with_seed_prices`].
pub const SEED_PRICES: &[(&str, f64)] = &[
    ("BTCUSD", 43250.0),
    ("ETHUSD", 2650.0),
    ("AAPL", 185.0),
    ("SPY", 475.0),
    ("QQQ", 385.0),
    ("GC", 2050.0),
    ("ES", 4750.0),
    ("EURUSD", 1.0850),
];

/// Shared mapping `Symbol -> latest price`.
#[derive(Debug, Default)]
pub struct PriceStore {
    prices: RwLock<HashMap<Symbol, f64>>,
}

impl PriceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with [`SEED_PRICES`].
    pub fn with_seed_prices() -> Result<Self> {
        let store = Self::new();
        for (raw, price) in SEED_PRICES {
            store.set(Symbol::new(raw)?, *price)?;
        }
        Ok(store)
    }

    /// Register `symbols` at [`BASELINE_PRICE`]; symbols that already have a
    /// price keep it.
    pub fn seed(&self, symbols: &[Symbol]) -> Result<()> {
        let mut prices = self.prices.write()?;
        for symbol in symbols {
            prices.entry(symbol.clone()).or_insert(BASELINE_PRICE);
        }
        Ok(())
    }

    /// Latest price for `symbol`, if any was ever written.
    pub fn get(&self, symbol: &Symbol) -> Result<Option<f64>> {
        Ok(self.prices.read()?.get(symbol).copied())
    }

    /// Latest price for `symbol`, or [`BASELINE_PRICE`] when unknown.
    pub fn price_or_baseline(&self, symbol: &Symbol) -> Result<f64> {
        Ok(self.get(symbol)?.unwrap_or(BASELINE_PRICE))
    }

    /// Overwrite the price of `symbol`.
    pub fn set(&self, symbol: Symbol, price: f64) -> Result<()> {
        self.prices.write()?.insert(symbol, price);
        Ok(())
    }

    /// All symbols with a known price, sorted.
    pub fn symbols(&self) -> Result<Vec<Symbol>> {
        let mut symbols: Vec<Symbol> = self.prices.read()?.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    /// Snapshot response for `symbol`: current price rounded to two decimals,
    /// falling back to the baseline for unknown symbols.
    pub fn snapshot(&self, symbol: &Symbol) -> Result<PriceSnapshot> {
        Ok(PriceSnapshot {
            symbol: symbol.clone(),
            price: round_price(self.price_or_baseline(symbol)?),
            timestamp: now_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn sym(raw: &str) -> Symbol {
        Symbol::new(raw).unwrap()
    }

    #[test]
    fn unknown_symbol_snapshot_uses_baseline() {
        let store = PriceStore::with_seed_prices().unwrap();
        let snapshot = store.snapshot(&sym("xyz")).unwrap();
        assert_eq!(snapshot.symbol.as_str(), "XYZ");
        assert_eq!(snapshot.price, 100.0);
        assert!(snapshot.timestamp > 0.0);
    }

    #[test]
    fn snapshot_rounds_stored_price() {
        let store = PriceStore::new();
        store.set(sym("BTCUSD"), 43500.1234).unwrap();
        assert_eq!(store.snapshot(&sym("btcusd")).unwrap().price, 43500.12);
    }

    #[test]
    fn last_write_wins() {
        let store = PriceStore::new();
        store.set(sym("SPY"), 1.0).unwrap();
        store.set(sym("spy"), 2.0).unwrap();
        assert_eq!(store.get(&sym("SPY")).unwrap(), Some(2.0));
    }

    #[test]
    fn seed_keeps_existing_prices() {
        let store = PriceStore::with_seed_prices().unwrap();
        store.seed(&[sym("AAPL"), sym("NVDA")]).unwrap();
        assert_eq!(store.get(&sym("AAPL")).unwrap(), Some(185.0));
        assert_eq!(store.get(&sym("NVDA")).unwrap(), Some(BASELINE_PRICE));
        assert_eq!(store.symbols().unwrap().len(), SEED_PRICES.len() + 1);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(PriceStore::new());
        let writers: Vec<_> = (0..4)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..500 {
                        store.set(sym("ES"), (n * 1000 + i) as f64).unwrap();
                    }
                })
            })
            .collect();
        for _ in 0..500 {
            if let Some(price) = store.get(&sym("ES")).unwrap() {
                assert!((0.0..4000.0).contains(&price));
            }
        }
        for writer in writers {
            writer.join().unwrap();
        }
        assert!(store.get(&sym("ES")).unwrap().is_some());
    }
}
