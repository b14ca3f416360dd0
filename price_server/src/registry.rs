//! Connection and subscription registry.
//!
//! `ConnectionRegistry` is the single source of truth for which live connection
//! receives which symbols. Every operation takes the registry lock for its whole
//! duration, so membership changes are atomic with respect to `snapshot`: a
//! broadcast iterates an owned copy of the subscriber list and can never observe a
//! half-removed connection. Outbound senders in a snapshot stay valid after the
//! connection is removed; sends to them simply fail or land in a queue nobody
//! drains any more.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info};
use price_common::protocol::SymbolSelector;
use price_common::{PriceError, Result, Symbol};

/// Encoded outbound text frame, shared between all recipients of one publish.
pub type OutboundFrame = Arc<str>;

/// Opaque identity of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationHandle(u64);

impl RegistrationHandle {
    /// Numeric id, unique for the lifetime of the registry.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry view of a live client session.
#[derive(Debug)]
pub struct Connection {
    /// Remote address, when the transport has one.
    pub peer: Option<SocketAddr>,
    /// Delivery channel drained by the owning session.
    pub outbound: Sender<OutboundFrame>,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    /// Build a connection together with the receiving end of its bounded
    /// outbound channel. A `capacity` of zero is raised to one.
    pub fn channel(peer: Option<SocketAddr>, capacity: usize) -> (Connection, Receiver<OutboundFrame>) {
        let (outbound, outbound_rx) = bounded(capacity.max(1));
        let connection = Connection {
            peer,
            outbound,
            connected_at: Utc::now(),
        };
        (connection, outbound_rx)
    }
}

/// One recipient in a registry snapshot.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Connection identity.
    pub handle: RegistrationHandle,
    /// Sender half of the connection's outbound channel.
    pub outbound: Sender<OutboundFrame>,
}

struct Entry {
    connection: Connection,
    subscriptions: HashSet<SymbolSelector>,
}

impl Entry {
    fn wants(&self, symbol: &Symbol) -> bool {
        self.subscriptions.contains(&SymbolSelector::All)
            || self.subscriptions.iter().any(|s| matches!(s, SymbolSelector::One(own) if own == symbol))
    }
}

/// Thread-safe set of live connections and their subscriptions.
pub struct ConnectionRegistry {
    entries: RwLock<BTreeMap<RegistrationHandle, Entry>>,
    next_id: AtomicU64,
    max_connections: usize,
    initial_subscriptions: Vec<SymbolSelector>,
}

impl ConnectionRegistry {
    /// Create a registry that accepts at most `max_connections` connections.
    pub fn new(max_connections: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            max_connections,
            initial_subscriptions: Vec::new(),
        }
    }

    /// Give every newly added connection the "all symbols" subscription.
    pub fn with_subscribe_all(mut self) -> Self {
        self.initial_subscriptions = vec![SymbolSelector::All];
        self
    }

    /// Insert `connection`. Fails with `PriceError::Capacity` when full.
    pub fn add(&self, connection: Connection) -> Result<RegistrationHandle> {
        let mut entries = self.entries.write()?;
        if entries.len() >= self.max_connections {
            return Err(PriceError::Capacity(self.max_connections));
        }
        let handle = RegistrationHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            "Connection {} registered (peer {:?}), {} live",
            handle,
            connection.peer,
            entries.len() + 1
        );
        entries.insert(
            handle,
            Entry {
                connection,
                subscriptions: self.initial_subscriptions.iter().cloned().collect(),
            },
        );
        Ok(handle)
    }

    /// Remove `handle`. Returns `false` (not an error) when it was already gone.
    pub fn remove(&self, handle: RegistrationHandle) -> Result<bool> {
        let removed = self.entries.write()?.remove(&handle);
        match removed {
            Some(entry) => {
                let lifetime = Utc::now() - entry.connection.connected_at;
                info!(
                    "Connection {} deregistered after {}s",
                    handle,
                    lifetime.num_seconds()
                );
                Ok(true)
            }
            None => {
                debug!("Connection {} already deregistered", handle);
                Ok(false)
            }
        }
    }

    /// Add `selector` to the subscriptions of `handle`. Returns `false` when the
    /// subscription already existed.
    pub fn subscribe(&self, handle: RegistrationHandle, selector: SymbolSelector) -> Result<bool> {
        let mut entries = self.entries.write()?;
        let entry = entries
            .get_mut(&handle)
            .ok_or(PriceError::UnknownConnection(handle.id()))?;
        Ok(entry.subscriptions.insert(selector))
    }

    /// Remove `selector` from the subscriptions of `handle`. Returns `false` when
    /// it was not subscribed.
    pub fn unsubscribe(&self, handle: RegistrationHandle, selector: &SymbolSelector) -> Result<bool> {
        let mut entries = self.entries.write()?;
        let entry = entries
            .get_mut(&handle)
            .ok_or(PriceError::UnknownConnection(handle.id()))?;
        Ok(entry.subscriptions.remove(selector))
    }

    /// Current subscriptions of `handle`, sorted.
    pub fn subscriptions(&self, handle: RegistrationHandle) -> Result<Vec<SymbolSelector>> {
        let entries = self.entries.read()?;
        let entry = entries
            .get(&handle)
            .ok_or(PriceError::UnknownConnection(handle.id()))?;
        let mut subscriptions: Vec<SymbolSelector> = entry.subscriptions.iter().cloned().collect();
        subscriptions.sort();
        Ok(subscriptions)
    }

    /// Point-in-time list of connections subscribed to `symbol` or to all
    /// symbols, ordered by handle. Each connection appears at most once.
    pub fn snapshot(&self, symbol: &Symbol) -> Result<Vec<Subscriber>> {
        let entries = self.entries.read()?;
        Ok(entries
            .iter()
            .filter(|(_, entry)| entry.wants(symbol))
            .map(|(handle, entry)| Subscriber {
                handle: *handle,
                outbound: entry.connection.outbound.clone(),
            })
            .collect())
    }

    /// `true` while `handle` is registered.
    pub fn contains(&self, handle: RegistrationHandle) -> Result<bool> {
        Ok(self.entries.read()?.contains_key(&handle))
    }

    /// Number of live connections.
    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.read()?.len())
    }

    /// `true` when no connection is registered.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.read()?.is_empty())
    }
}
