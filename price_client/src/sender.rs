//! Sending frames to the price server over the streaming channel.
//!
//! This module provides helpers for encoding subscription requests and for
//! sending keep-alive pings on a fixed interval from the receive loop.
use log::{debug, info};
use price_common::PriceError;
use price_common::protocol::PING_TEXT;
use serde_json::json;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tungstenite::{Message, WebSocket};

/// Client side of the streaming WebSocket.
pub type StreamSocket = WebSocket<TcpStream>;

/// Sends frames to the server and tracks when the next keep-alive is due.
pub struct FrameSender {
    interval: Duration,
    last_ping: Instant,
}

impl FrameSender {
    /// Ping every `interval`, counting from `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        info!("Pinging every {:?}", interval);
        Self {
            interval,
            last_ping: now,
        }
    }

    /// Write one text frame.
    pub fn send_frame(socket: &mut StreamSocket, frame: &str) -> Result<(), PriceError> {
        socket
            .send(Message::Text(frame.to_string()))
            .map_err(|e| PriceError::Transport(e.to_string()))
    }

    /// Send a subscribe request for `symbol` on `channel`.
    pub fn subscribe(socket: &mut StreamSocket, channel: &str, symbol: &str) -> Result<(), PriceError> {
        let frame = json!({
            "action": "subscribe",
            "channel": channel,
            "symbol": symbol,
        });
        info!("Subscribing to {} on channel {}", symbol, channel);
        Self::send_frame(socket, &frame.to_string())
    }

    /// `true` once `interval` has passed since the last ping.
    pub fn ping_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_ping) >= self.interval
    }

    /// Send `ping` if one is due at `now`.
    pub fn ping_if_due(&mut self, socket: &mut StreamSocket, now: Instant) -> Result<(), PriceError> {
        if self.ping_due(now) {
            Self::send_frame(socket, PING_TEXT)?;
            self.last_ping = now;
            debug!("PING sent");
        }
        Ok(())
    }
}
