//! Process wiring: shared state, listeners and the feed driver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};
use price_common::Result;
use price_common::net::addr;

use crate::broadcast::BroadcastEngine;
use crate::config::ServerConfig;
use crate::listener::StreamListener;
use crate::model::feed::{FeedDriver, RandomWalkFeed};
use crate::model::price_store::PriceStore;
use crate::registry::ConnectionRegistry;
use crate::snapshot::SnapshotServer;

/// Handles to a started server.
pub struct PriceServer {
    /// Bound address of the streaming channel.
    pub stream_addr: SocketAddr,
    /// Bound address of the snapshot endpoint.
    pub snapshot_addr: SocketAddr,
    /// Shared connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Shared price store.
    pub store: Arc<PriceStore>,
    /// Broadcast engine used by the feed driver.
    pub engine: Arc<BroadcastEngine>,
    stream_thread: JoinHandle<()>,
}

impl PriceServer {
    /// Bind both listeners and start the accept loops and, if enabled, the
    /// feed driver. All threads run for the lifetime of the process.
    pub fn start(config: ServerConfig) -> Result<PriceServer> {
        let store = Arc::new(PriceStore::with_seed_prices()?);
        store.seed(&config.symbols)?;

        let mut registry = ConnectionRegistry::new(config.max_connections);
        if config.subscribe_all {
            registry = registry.with_subscribe_all();
        }
        let registry = Arc::new(registry);
        let engine = Arc::new(BroadcastEngine::new(Arc::clone(&registry), Arc::clone(&store)));

        let stream_listener = StreamListener::new(&addr(&config.bind_ip, config.stream_port))?;
        let snapshot_server = SnapshotServer::new(&addr(&config.bind_ip, config.snapshot_port))?;
        let stream_addr = stream_listener.local_addr()?;
        let snapshot_addr = snapshot_server.local_addr()?;

        let session_config = config.session_config();
        let write_timeout = config.write_timeout;
        let stream_registry = Arc::clone(&registry);
        let stream_thread = thread::Builder::new()
            .name("stream-listener".to_string())
            .spawn(move || {
                if let Err(e) = stream_listener.accept_loop(stream_registry, session_config, write_timeout) {
                    error!("Stream listener failed: {}", e);
                }
            })?;

        let snapshot_store = Arc::clone(&store);
        thread::Builder::new()
            .name("snapshot-listener".to_string())
            .spawn(move || {
                if let Err(e) = snapshot_server.serve(snapshot_store) {
                    error!("Snapshot listener failed: {}", e);
                }
            })?;

        if config.run_feed {
            FeedDriver::start(
                RandomWalkFeed::new(Arc::clone(&store)),
                Arc::clone(&engine),
                config.tick_interval,
            )?;
        }

        info!(
            "Price server up: stream {}, snapshot {}, idle window {:?}",
            stream_addr, snapshot_addr, config.idle_window
        );
        Ok(PriceServer {
            stream_addr,
            snapshot_addr,
            registry,
            store,
            engine,
            stream_thread,
        })
    }

    /// Block until the stream listener exits.
    pub fn wait(self) {
        if self.stream_thread.join().is_err() {
            error!("Stream listener thread panicked");
        }
    }
}
