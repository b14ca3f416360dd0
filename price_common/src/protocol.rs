//! Wire protocol of the streaming channel.
//!
//! Frames are UTF-8 JSON text. Inbound frames are classified into a
//! `ClientMessage`; text that is not JSON is kept as `{"raw": <text>}` rather
//! than rejected. Outbound frames are `ServerMessage` values tagged by `type`.
//!
//! Inbound shapes:
//! - `{"type":"ping"}` or the literal text `ping`
//! - `{"action":"subscribe","channel":..,"symbol":..}`
//! - `{"action":"unsubscribe","channel":..,"symbol":..}`
//! - anything else, acknowledged with an echo
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PriceError;
use crate::result::Result;
use crate::symbol::Symbol;

/// Literal text accepted as a ping.
pub const PING_TEXT: &str = "ping";
/// Symbol value selecting every symbol.
pub const ALL_SYMBOLS: &str = "*";

/// Parse `text` as JSON, reporting `PriceError::MalformedPayload` otherwise.
pub fn parse_payload(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| PriceError::MalformedPayload(e.to_string()))
}

/// Wrap undecodable text as `{"raw": text}`.
pub fn raw_payload(text: &str) -> Value {
    let mut map = Map::new();
    map.insert("raw".to_string(), Value::String(text.to_string()));
    Value::Object(map)
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Client keep-alive; answered with `pong`.
    Ping,
    /// Add a subscription. `channel` and `symbol` are echoed back verbatim.
    Subscribe {
        /// Client-chosen channel label.
        channel: Value,
        /// Requested symbol as sent by the client.
        symbol: Value,
    },
    /// Drop a subscription.
    Unsubscribe {
        /// Client-chosen channel label.
        channel: Value,
        /// Symbol as sent by the client.
        symbol: Value,
    },
    /// Anything else; acknowledged with the decoded payload.
    Other(Value),
}

impl ClientMessage {
    /// Classify one inbound text frame. Never fails: malformed JSON becomes
    /// `Other({"raw": text})`.
    pub fn parse(text: &str) -> ClientMessage {
        if text == PING_TEXT {
            return ClientMessage::Ping;
        }
        let payload = parse_payload(text).unwrap_or_else(|_| raw_payload(text));

        let Some(object) = payload.as_object() else {
            return ClientMessage::Other(payload);
        };
        if object.get("type").and_then(Value::as_str) == Some("ping") {
            return ClientMessage::Ping;
        }
        let field = |name: &str| object.get(name).cloned().unwrap_or(Value::Null);
        match object.get("action").and_then(Value::as_str) {
            Some("subscribe") => ClientMessage::Subscribe {
                channel: field("channel"),
                symbol: field("symbol"),
            },
            Some("unsubscribe") => ClientMessage::Unsubscribe {
                channel: field("channel"),
                symbol: field("symbol"),
            },
            _ => ClientMessage::Other(payload),
        }
    }
}

/// Target of a subscribe/unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolSelector {
    /// Every symbol.
    All,
    /// One symbol.
    One(Symbol),
}

impl SymbolSelector {
    /// Interpret the `symbol` field of a request. A missing/null symbol or
    /// `"*"` selects all symbols; any other string must be a valid symbol.
    pub fn from_value(value: &Value) -> Result<SymbolSelector> {
        match value {
            Value::Null => Ok(SymbolSelector::All),
            Value::String(s) if s.trim() == ALL_SYMBOLS => Ok(SymbolSelector::All),
            Value::String(s) => Ok(SymbolSelector::One(Symbol::new(s)?)),
            other => Err(PriceError::InvalidSymbol(other.to_string())),
        }
    }
}

/// Outbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Reply to a client ping.
    Pong,
    /// Server-initiated keep-alive.
    Ping,
    /// Subscription accepted.
    Subscribed {
        /// Channel as sent by the client.
        channel: Value,
        /// Symbol as sent by the client.
        symbol: Value,
    },
    /// Subscription removed.
    Unsubscribed {
        /// Channel as sent by the client.
        channel: Value,
        /// Symbol as sent by the client.
        symbol: Value,
    },
    /// Echo acknowledgment for unrecognized frames.
    Ack {
        /// Decoded inbound payload.
        received: Value,
    },
    /// Broadcast price update.
    Price {
        /// Instrument.
        symbol: Symbol,
        /// Price rounded to two decimals.
        price: f64,
        /// Seconds since the Unix epoch.
        timestamp: f64,
    },
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON text frame.
    pub fn from_json(text: &str) -> Result<ServerMessage> {
        Ok(serde_json::from_str(text)?)
    }
}
