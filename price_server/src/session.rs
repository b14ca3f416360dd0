//! Per-connection protocol handler.
//!
//! A `ConnectionSession` owns one connection from registration to teardown:
//!
//! 1. `accept` registers the connection and creates its bounded outbound queue.
//! 2. `run` loops on a crossbeam `select!` over the inbound event channel and the
//!    outbound queue, with the heartbeat deadline as the `default` timeout. When
//!    both channels are ready `select!` picks one at random, so neither side
//!    starves the other.
//! 3. Inbound frames are answered directly on the transport (`pong`,
//!    `subscribed`, `unsubscribed`, `ack`); queued broadcast frames are written
//!    as they arrive; an elapsed idle window produces a server `ping`.
//! 4. On disconnect, transport failure, or eviction the loop exits and the
//!    connection is deregistered. Deregistration lives in a drop guard, so it
//!    also happens when the loop unwinds.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use log::{debug, info, warn};
use price_common::protocol::{SymbolSelector, parse_payload, raw_payload};
use price_common::{ClientMessage, PriceError, Result, ServerMessage};
use serde_json::Value;

use crate::model::heartbeat::{Heartbeat, HeartbeatAction};
use crate::registry::{Connection, ConnectionRegistry, OutboundFrame, RegistrationHandle};
use crate::transport::{FrameWriter, InboundEvent};

/// Tunables for a single session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Inbound silence tolerated before a server ping.
    pub idle_window: Duration,
    /// Capacity of the outbound broadcast queue.
    pub outbound_capacity: usize,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection.
    Disconnected,
    /// The registry dropped the connection (delivery failure).
    Evicted,
    /// A read or write failed.
    TransportFailed(String),
}

/// Deregisters on drop. `ConnectionRegistry::remove` is idempotent, so an
/// eviction followed by teardown is harmless.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    handle: RegistrationHandle,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Err(e) = self.registry.remove(self.handle) {
            warn!("Failed to deregister connection {}: {}", self.handle, e);
        }
    }
}

/// One client connection's serve loop.
pub struct ConnectionSession<W: FrameWriter> {
    registration: Registration,
    peer: Option<SocketAddr>,
    writer: W,
    inbound: Receiver<InboundEvent>,
    outbound: Receiver<OutboundFrame>,
    heartbeat: Heartbeat,
}

impl<W: FrameWriter> ConnectionSession<W> {
    /// Register a new connection. Fails with `PriceError::Capacity` when the
    /// registry is full; the caller then drops the transport.
    pub fn accept(
        registry: Arc<ConnectionRegistry>,
        peer: Option<SocketAddr>,
        writer: W,
        inbound: Receiver<InboundEvent>,
        config: SessionConfig,
    ) -> Result<Self> {
        let (connection, outbound) = Connection::channel(peer, config.outbound_capacity);
        let handle = registry.add(connection)?;
        Ok(Self {
            registration: Registration { registry, handle },
            peer,
            writer,
            inbound,
            outbound,
            heartbeat: Heartbeat::new(config.idle_window, Instant::now()),
        })
    }

    /// Registry handle of this session.
    pub fn handle(&self) -> RegistrationHandle {
        self.registration.handle
    }

    /// Serve until the connection ends, then tear it down.
    pub fn run(mut self) -> SessionEnd {
        let end = self.serve();
        if let SessionEnd::TransportFailed(_) = &end {
            self.heartbeat.mark_dead();
        }
        self.writer.close();
        info!(
            "Session {} ({:?}) ended: {:?}, heartbeat {} (idle window {:?})",
            self.handle(),
            self.peer,
            end,
            self.heartbeat.state(),
            self.heartbeat.idle_window()
        );
        end
    }

    fn serve(&mut self) -> SessionEnd {
        let inbound = self.inbound.clone();
        let outbound = self.outbound.clone();
        loop {
            let wait = match self.heartbeat.poll(Instant::now()) {
                HeartbeatAction::Wait(wait) => wait,
                HeartbeatAction::SendPing => {
                    if let Err(e) = self.send(&ServerMessage::Ping) {
                        return SessionEnd::TransportFailed(e.to_string());
                    }
                    debug!("Session {} idle, keep-alive ping sent", self.handle());
                    self.heartbeat.ping_sent(Instant::now());
                    continue;
                }
                HeartbeatAction::Close => {
                    return SessionEnd::TransportFailed("heartbeat dead".to_string());
                }
            };

            select! {
                recv(inbound) -> event => match event {
                    Ok(InboundEvent::Frame(text)) => {
                        self.heartbeat.record_inbound(Instant::now());
                        if let Err(e) = self.dispatch(&text) {
                            return end_for(e);
                        }
                    }
                    Ok(InboundEvent::Closed) | Err(_) => return SessionEnd::Disconnected,
                    Ok(InboundEvent::Failed(reason)) => return SessionEnd::TransportFailed(reason),
                },
                recv(outbound) -> frame => match frame {
                    Ok(frame) => {
                        if let Err(e) = self.writer.write_frame(&frame) {
                            return end_for(e);
                        }
                    }
                    // The registry held the only sender.
                    Err(_) => return SessionEnd::Evicted,
                },
                default(wait) => {}
            }
        }
    }

    fn dispatch(&mut self, text: &str) -> Result<()> {
        debug!("Session {} <- {}", self.handle(), text);
        let reply = match ClientMessage::parse(text) {
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::Subscribe { channel, symbol } => match SymbolSelector::from_value(&symbol) {
                Ok(selector) => {
                    let symbol = echo_symbol(&selector, symbol);
                    self.registration
                        .registry
                        .subscribe(self.registration.handle, selector)?;
                    info!("Session {} subscribed to {}", self.handle(), symbol);
                    ServerMessage::Subscribed { channel, symbol }
                }
                Err(_) => acknowledge(text),
            },
            ClientMessage::Unsubscribe { channel, symbol } => match SymbolSelector::from_value(&symbol) {
                Ok(selector) => {
                    let symbol = echo_symbol(&selector, symbol);
                    self.registration
                        .registry
                        .unsubscribe(self.registration.handle, &selector)?;
                    info!("Session {} unsubscribed from {}", self.handle(), symbol);
                    ServerMessage::Unsubscribed { channel, symbol }
                }
                Err(_) => acknowledge(text),
            },
            ClientMessage::Other(received) => ServerMessage::Ack { received },
        };
        self.send(&reply)
    }

    fn send(&mut self, message: &ServerMessage) -> Result<()> {
        let frame = message.to_json()?;
        self.writer.write_frame(&frame)
    }
}

/// Normalized symbol text for single-symbol requests; the client's own value
/// for "all" requests.
fn echo_symbol(selector: &SymbolSelector, original: Value) -> Value {
    match selector {
        SymbolSelector::One(symbol) => Value::String(symbol.to_string()),
        SymbolSelector::All => original,
    }
}

fn acknowledge(text: &str) -> ServerMessage {
    ServerMessage::Ack {
        received: parse_payload(text).unwrap_or_else(|_| raw_payload(text)),
    }
}

fn end_for(error: PriceError) -> SessionEnd {
    match error {
        PriceError::UnknownConnection(_) => SessionEnd::Evicted,
        other => SessionEnd::TransportFailed(other.to_string()),
    }
}
