//! Error types shared between client and server.
//!
//! The `PriceError` enum unifies common failure cases for I/O, serialization,
//! lock poisoning, and the fan-out domain (capacity, unknown handles,
//! failed deliveries, malformed payloads, broken transports), allowing crates
//! to propagate a single error type.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by client and server.
#[derive(Error, Debug)]
pub enum PriceError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Error while parsing a symbol-list file.
    #[error("Parse symbols file error: {0}")]
    ParseSymbolsFile(String),

    /// A symbol was empty or contained whitespace.
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),

    /// The registry is full; the new connection is rejected.
    #[error("Connection limit reached ({0} connections)")]
    Capacity(usize),

    /// The handle does not refer to a registered connection.
    #[error("Unknown connection: {0}")]
    UnknownConnection(u64),

    /// A single outbound send failed.
    #[error("Delivery to connection {id} failed: {reason}")]
    Delivery {
        /// Connection the frame was addressed to.
        id: u64,
        /// Why the frame could not be queued.
        reason: String,
    },

    /// Inbound text is not valid JSON.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Read/write failure or abrupt disconnect on a session transport.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl<T> From<PoisonError<T>> for PriceError {
    fn from(err: PoisonError<T>) -> Self {
        PriceError::MutexLock(err.to_string())
    }
}
