//! Domain models and utilities for the price server.
//!
//! This module groups the state and helpers used by sessions, the broadcast
//! engine, and the background feed driver:
//! - `price_store` — latest known price per symbol and snapshot reads.
//! - `heartbeat` — per-connection idle-window state machine.
//! - `feed` — feed producer trait, random-walk producer, and the periodic driver.

pub mod feed;
pub mod heartbeat;
pub mod price_store;
