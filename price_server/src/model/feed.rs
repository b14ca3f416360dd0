//! Price feed producer and the periodic broadcast driver.
//!
//! The core only distributes prices; where they come from is behind the
//! `FeedSource` trait. `RandomWalkFeed` is the built-in demo producer: every tick
//! it picks one known symbol at random and moves its last price by up to ±1 %.
//!
//! `FeedDriver::start` runs the process-wide background thread. Every
//! `interval` it asks the feed for a tick and publishes it through the
//! `BroadcastEngine`, but only while at least one connection is registered.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info};
use price_common::{PriceQuote, Result, Symbol};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::broadcast::{BroadcastEngine, PublishReport};
use crate::model::price_store::PriceStore;

/// Source of `(symbol, new price)` events.
pub trait FeedSource: Send {
    /// Produce the next price event, or `None` when there is nothing to emit.
    fn next_tick(&mut self) -> Option<(Symbol, f64)>;
}

/// Random-walk producer over the symbols currently in the price store.
pub struct RandomWalkFeed {
    store: Arc<PriceStore>,
}

impl RandomWalkFeed {
    /// Create a producer walking the prices held in `store`.
    pub fn new(store: Arc<PriceStore>) -> Self {
        Self { store }
    }

    /// Next price in a uniform walk of at most ±1 % around `current_price`,
    /// never below 0.01.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        (current_price * (1.0 + change)).max(0.01)
    }
}

impl FeedSource for RandomWalkFeed {
    fn next_tick(&mut self) -> Option<(Symbol, f64)> {
        let symbols = match self.store.symbols() {
            Ok(symbols) => symbols,
            Err(e) => {
                error!("Feed cannot read price store: {}", e);
                return None;
            }
        };
        let symbol = symbols.choose(&mut rand::rng())?.clone();
        let current = self.store.price_or_baseline(&symbol).ok()?;
        Some((symbol, Self::next_price(current)))
    }
}

/// Background driver publishing feed ticks at a fixed cadence.
pub struct FeedDriver;

impl FeedDriver {
    /// Run one tick: publish the next feed event if anyone is connected.
    pub fn tick<F: FeedSource>(feed: &mut F, engine: &BroadcastEngine) -> Result<Option<PublishReport>> {
        if engine.registry().is_empty()? {
            return Ok(None);
        }
        let Some((symbol, price)) = feed.next_tick() else {
            return Ok(None);
        };
        let report = engine.publish(&PriceQuote::new(symbol, price))?;
        Ok(Some(report))
    }

    /// Start the driver thread. It runs for the lifetime of the process.
    pub fn start<F: FeedSource + 'static>(
        mut feed: F,
        engine: Arc<BroadcastEngine>,
        interval: Duration,
    ) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new().name("feed-driver".to_string()).spawn(move || {
            info!("Feed driver started, ticking every {:?}", interval);
            loop {
                match Self::tick(&mut feed, &engine) {
                    Ok(Some(report)) => debug!(
                        "Tick delivered to {}, evicted {}",
                        report.delivered(),
                        report.evicted.len()
                    ),
                    Ok(None) => {}
                    Err(e) => error!("Feed tick failed: {}", e),
                }
                thread::sleep(interval);
            }
        })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Connection, ConnectionRegistry};
    use price_common::protocol::SymbolSelector;
    use std::collections::VecDeque;

    struct ScriptedFeed(VecDeque<(Symbol, f64)>);

    impl FeedSource for ScriptedFeed {
        fn next_tick(&mut self) -> Option<(Symbol, f64)> {
            self.0.pop_front()
        }
    }

    fn sym(raw: &str) -> Symbol {
        Symbol::new(raw).unwrap()
    }

    #[test]
    fn random_walk_stays_within_one_percent() {
        for _ in 0..1000 {
            let next = RandomWalkFeed::next_price(100.0);
            assert!((99.0..=101.0).contains(&next));
        }
        assert_eq!(RandomWalkFeed::next_price(0.0), 0.01);
    }

    #[test]
    fn random_walk_picks_known_symbols() {
        let store = Arc::new(PriceStore::with_seed_prices().unwrap());
        let known = store.symbols().unwrap();
        let mut feed = RandomWalkFeed::new(Arc::clone(&store));
        for _ in 0..50 {
            let (symbol, price) = feed.next_tick().unwrap();
            assert!(known.contains(&symbol));
            assert!(price > 0.0);
        }
        assert!(RandomWalkFeed::new(Arc::new(PriceStore::new())).next_tick().is_none());
    }

    #[test]
    fn tick_is_skipped_without_connections() {
        let engine = BroadcastEngine::new(Arc::new(ConnectionRegistry::new(4)), Arc::new(PriceStore::new()));
        let mut feed = ScriptedFeed(VecDeque::from([(sym("ES"), 4751.0)]));
        assert!(FeedDriver::tick(&mut feed, &engine).unwrap().is_none());
        assert_eq!(feed.0.len(), 1);
        assert_eq!(engine.store().get(&sym("ES")).unwrap(), None);
    }

    #[test]
    fn tick_publishes_to_subscribers() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        let engine = BroadcastEngine::new(Arc::clone(&registry), Arc::new(PriceStore::new()));
        let (connection, rx) = Connection::channel(None, 4);
        let handle = registry.add(connection).unwrap();
        registry.subscribe(handle, SymbolSelector::All).unwrap();

        let mut feed = ScriptedFeed(VecDeque::from([(sym("GC"), 2051.5)]));
        let report = FeedDriver::tick(&mut feed, &engine).unwrap().unwrap();
        assert_eq!(report.delivered(), 1);
        assert!(rx.try_recv().is_ok());
        assert_eq!(engine.store().get(&sym("GC")).unwrap(), Some(2051.5));
    }
}
