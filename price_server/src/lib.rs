//! Real-time price distribution server.
//!
//! Clients connect to the streaming port, subscribe to symbols, and receive
//! `price` frames as the feed produces them; a separate HTTP port answers
//! point-in-time snapshot queries. The building blocks, leaves first:
//!
//! - `model::price_store::PriceStore` — latest price per symbol.
//! - `registry::ConnectionRegistry` — live connections and their subscriptions.
//! - `broadcast::BroadcastEngine` — fan-out with per-connection failure isolation
//!   and eviction of slow or dead consumers.
//! - `model::heartbeat::Heartbeat` — idle-window keep-alive state machine.
//! - `session::ConnectionSession` — per-connection protocol loop.
//! - `listener`, `snapshot`, `model::feed` and `server` — threads that tie it
//!   together.
//!
//! Concurrency: one session thread and one socket pump thread per connection,
//! one feed driver thread, one accept thread for the stream listener and one
//! single-threaded tokio runtime for the snapshot endpoint. The registry is the
//! only structure shared between sessions and the broadcast path.
#![warn(missing_docs)]

pub mod broadcast;
pub mod config;
pub mod listener;
pub mod model;
pub mod registry;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use broadcast::{BroadcastEngine, DeliveryOutcome, PublishReport};
pub use config::ServerConfig;
pub use model::price_store::PriceStore;
pub use registry::{ConnectionRegistry, RegistrationHandle};
pub use server::PriceServer;
pub use session::{ConnectionSession, SessionEnd};
