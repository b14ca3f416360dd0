//!
//! Common types and utilities shared by the price server and client.
//!
//! This crate aggregates:
//! - `error` — unified error type `PriceError` used across the workspace.
//! - `result` — handy `Result<T, PriceError>` alias.
//! - `symbol` — case-normalized instrument symbols and the symbol-list parser.
//! - `quote` — `PriceQuote` events and `PriceSnapshot` responses.
//! - `protocol` — JSON text frames exchanged on the streaming channel.
//! - `net` — networking constants and small helpers.
#![warn(missing_docs)]
pub mod error;
pub mod net;
pub mod protocol;
pub mod quote;
pub mod result;
pub mod symbol;

pub use error::PriceError;
pub use protocol::{ClientMessage, ServerMessage};
pub use quote::{PriceQuote, PriceSnapshot};
pub use result::Result;
pub use symbol::Symbol;
