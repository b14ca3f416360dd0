//! Price fan-out to subscribed connections.
//!
//! `BroadcastEngine::publish` records the new price, encodes the `price` frame
//! once, and offers it to every subscriber from a registry snapshot with a
//! non-blocking `try_send`. A full or closed outbound queue is a delivery failure
//! for that one connection only: it is recorded in the `PublishReport`, the
//! connection is evicted from the registry, and the loop moves on. Publishing
//! never blocks on a slow consumer.
//!
//! Each connection has exactly one FIFO outbound queue, so frames reach a given
//! connection in the order `publish` offered them.

use std::sync::Arc;

use crossbeam_channel::TrySendError;
use log::{debug, warn};
use price_common::{PriceError, PriceQuote, Result};

use crate::model::price_store::PriceStore;
use crate::registry::{ConnectionRegistry, OutboundFrame, RegistrationHandle};

/// Result of offering one frame to one connection.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The frame was queued.
    Delivered(RegistrationHandle),
    /// The frame could not be queued; the connection is evicted.
    Failed {
        /// Target connection.
        handle: RegistrationHandle,
        /// A `PriceError::Delivery` describing the failure.
        error: PriceError,
    },
}

impl DeliveryOutcome {
    /// Connection this outcome refers to.
    pub fn handle(&self) -> RegistrationHandle {
        match self {
            DeliveryOutcome::Delivered(handle) => *handle,
            DeliveryOutcome::Failed { handle, .. } => *handle,
        }
    }

    /// `true` for `Delivered`.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

/// Per-publish summary.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// One outcome per targeted connection, in snapshot order.
    pub outcomes: Vec<DeliveryOutcome>,
    /// Connections this publish removed from the registry.
    pub evicted: Vec<RegistrationHandle>,
}

impl PublishReport {
    /// Number of successful deliveries.
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    /// Failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &DeliveryOutcome> {
        self.outcomes.iter().filter(|o| !o.is_delivered())
    }

    /// `true` when every delivery succeeded.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(DeliveryOutcome::is_delivered)
    }
}

/// Distributes price events to subscribers and maintains the price store.
pub struct BroadcastEngine {
    registry: Arc<ConnectionRegistry>,
    store: Arc<PriceStore>,
}

impl BroadcastEngine {
    /// Create an engine over a shared registry and price store.
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<PriceStore>) -> Self {
        Self { registry, store }
    }

    /// Shared registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Shared price store.
    pub fn store(&self) -> &Arc<PriceStore> {
        &self.store
    }

    /// Record `quote` in the store and fan it out.
    ///
    /// Errors only when the store or registry lock is poisoned or the frame
    /// cannot be encoded; individual delivery failures are reported in the
    /// returned `PublishReport`.
    pub fn publish(&self, quote: &PriceQuote) -> Result<PublishReport> {
        self.store.set(quote.symbol.clone(), quote.price)?;
        let frame: OutboundFrame = quote.to_message().to_json()?.into();

        let subscribers = self.registry.snapshot(&quote.symbol)?;
        let mut report = PublishReport::default();
        for subscriber in subscribers {
            let outcome = match subscriber.outbound.try_send(Arc::clone(&frame)) {
                Ok(()) => DeliveryOutcome::Delivered(subscriber.handle),
                Err(err) => DeliveryOutcome::Failed {
                    handle: subscriber.handle,
                    error: delivery_error(subscriber.handle, &err),
                },
            };
            report.outcomes.push(outcome);
        }

        for outcome in &report.outcomes {
            if let DeliveryOutcome::Failed { handle, .. } = outcome {
                if self.registry.remove(*handle)? {
                    report.evicted.push(*handle);
                }
            }
        }

        if report.is_clean() {
            debug!(
                "Published {} {:.2} to {} connection(s)",
                quote.symbol,
                quote.price,
                report.delivered()
            );
        } else {
            let reasons: Vec<String> = report
                .failures()
                .filter_map(|o| match o {
                    DeliveryOutcome::Failed { error, .. } => Some(error.to_string()),
                    DeliveryOutcome::Delivered(_) => None,
                })
                .collect();
            warn!(
                "Published {}: {} delivered, {} failed, evicted {:?}: {}",
                quote.symbol,
                report.delivered(),
                reasons.len(),
                report.evicted,
                reasons.join("; ")
            );
        }
        Ok(report)
    }
}

fn delivery_error(handle: RegistrationHandle, err: &TrySendError<OutboundFrame>) -> PriceError {
    let reason = match err {
        TrySendError::Full(_) => "outbound queue full",
        TrySendError::Disconnected(_) => "outbound channel closed",
    };
    PriceError::Delivery {
        id: handle.id(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Connection;
    use crossbeam_channel::Receiver;
    use price_common::Symbol;
    use price_common::protocol::SymbolSelector;
    use serde_json::Value;

    fn sym(raw: &str) -> Symbol {
        Symbol::new(raw).unwrap()
    }

    fn engine(max: usize) -> BroadcastEngine {
        BroadcastEngine::new(Arc::new(ConnectionRegistry::new(max)), Arc::new(PriceStore::new()))
    }

    fn connect(engine: &BroadcastEngine, capacity: usize, selector: SymbolSelector) -> (RegistrationHandle, Receiver<OutboundFrame>) {
        let (connection, rx) = Connection::channel(None, capacity);
        let handle = engine.registry().add(connection).unwrap();
        engine.registry().subscribe(handle, selector).unwrap();
        (handle, rx)
    }

    fn decode(frame: &OutboundFrame) -> Value {
        serde_json::from_str(frame).unwrap()
    }

    #[test]
    fn delivers_rounded_price_frame_and_updates_store() {
        let engine = engine(4);
        let (_handle, rx) = connect(&engine, 4, SymbolSelector::One(sym("BTCUSD")));
        let report = engine
            .publish(&PriceQuote::at(sym("BTCUSD"), 43500.1249, 1.0))
            .unwrap();
        assert!(report.is_clean());
        let frame = decode(&rx.try_recv().unwrap());
        assert_eq!(frame["type"], "price");
        assert_eq!(frame["symbol"], "BTCUSD");
        assert_eq!(frame["price"], 43500.12);
        assert_eq!(engine.store().get(&sym("BTCUSD")).unwrap(), Some(43500.1249));
    }

    #[test]
    fn only_matching_subscribers_receive() {
        let engine = engine(4);
        let (_a, rx_a) = connect(&engine, 4, SymbolSelector::One(sym("SPY")));
        let (_b, rx_b) = connect(&engine, 4, SymbolSelector::One(sym("QQQ")));
        let (_c, rx_c) = connect(&engine, 4, SymbolSelector::All);
        let report = engine.publish(&PriceQuote::new(sym("SPY"), 475.0)).unwrap();
        assert_eq!(report.delivered(), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert!(rx_c.try_recv().is_ok());
    }

    #[test]
    fn per_connection_order_is_publish_order() {
        let engine = engine(4);
        let (_handle, rx) = connect(&engine, 64, SymbolSelector::All);
        for i in 0..50 {
            let symbol = if i % 2 == 0 { "ES" } else { "GC" };
            engine
                .publish(&PriceQuote::at(sym(symbol), 100.0 + i as f64, i as f64))
                .unwrap();
        }
        let timestamps: Vec<f64> = rx
            .try_iter()
            .map(|f| decode(&f)["timestamp"].as_f64().unwrap())
            .collect();
        let expected: Vec<f64> = (0..50).map(|i| i as f64).collect();
        assert_eq!(timestamps, expected);
    }

    #[test]
    fn closed_channel_is_evicted_without_blocking_others() {
        let engine = engine(4);
        let (dead, dead_rx) = connect(&engine, 4, SymbolSelector::All);
        let (live, live_rx) = connect(&engine, 4, SymbolSelector::All);
        drop(dead_rx);

        let report = engine.publish(&PriceQuote::new(sym("ETHUSD"), 2650.0)).unwrap();

        assert_eq!(report.evicted, vec![dead]);
        assert_eq!(report.delivered(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.handle(), dead);
        assert!(matches!(
            failure,
            DeliveryOutcome::Failed { error: PriceError::Delivery { .. }, .. }
        ));
        assert!(live_rx.try_recv().is_ok());
        assert!(!engine.registry().contains(dead).unwrap());
        assert!(engine.registry().contains(live).unwrap());
    }

    #[test]
    fn slow_consumer_is_dropped_not_buffered() {
        let engine = engine(4);
        let (slow, slow_rx) = connect(&engine, 1, SymbolSelector::All);
        let (_fast, fast_rx) = connect(&engine, 8, SymbolSelector::All);

        engine.publish(&PriceQuote::new(sym("AAPL"), 185.0)).unwrap();
        let report = engine.publish(&PriceQuote::new(sym("AAPL"), 186.0)).unwrap();

        assert_eq!(report.evicted, vec![slow]);
        assert_eq!(slow_rx.try_iter().count(), 1);
        assert_eq!(fast_rx.try_iter().count(), 2);

        // Evicted connections are no longer targeted.
        let report = engine.publish(&PriceQuote::new(sym("AAPL"), 187.0)).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.outcomes.len(), 1);
    }

    #[test]
    fn publish_without_subscribers_still_updates_store() {
        let engine = engine(4);
        let report = engine.publish(&PriceQuote::new(sym("EURUSD"), 1.09)).unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(engine.store().get(&sym("EURUSD")).unwrap(), Some(1.09));
    }
}
