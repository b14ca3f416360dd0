//! Per-connection keep-alive state machine.
//!
//! A `Heartbeat` tracks the last inbound activity of one connection and decides
//! when the server should send a keep-alive ping:
//!
//! - `ACTIVE` — traffic was seen within the idle window.
//! - `IDLE-PING-SENT` — the window elapsed and a ping went out. Another window of
//!   silence produces another ping; missing a window is not fatal by itself.
//! - `DEAD` — a send failed (the ping itself or any later operation). Terminal.
//!
//! Any inbound frame moves `IDLE-PING-SENT` back to `ACTIVE`.
//!
//! Time is passed in by the caller as `std::time::Instant`, which keeps the state
//! machine free of clocks and sleeps and lets tests step through transitions.

use std::time::{Duration, Instant};

use strum_macros::Display;

/// Shortest idle window; a zero window would ping on every loop iteration.
pub const MIN_IDLE_WINDOW: Duration = Duration::from_millis(1);

/// Wait returned when the ping deadline is past what `Instant` can represent.
const FAR_FUTURE_WAIT: Duration = Duration::from_secs(3600);

/// Liveness state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HeartbeatState {
    /// Inbound traffic seen within the idle window.
    #[strum(serialize = "ACTIVE")]
    Active,
    /// Idle window elapsed, keep-alive ping issued.
    #[strum(serialize = "IDLE-PING-SENT")]
    IdlePingSent,
    /// Transport failed; the connection must be torn down.
    #[strum(serialize = "DEAD")]
    Dead,
}

/// What the session loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing due; wait at most this long for traffic.
    Wait(Duration),
    /// The idle window elapsed; send a ping now.
    SendPing,
    /// The connection is dead.
    Close,
}

/// Idle-window watchdog for one connection.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    idle_window: Duration,
    last_activity: Instant,
    last_ping: Option<Instant>,
    state: HeartbeatState,
}

impl Heartbeat {
    /// Start in `ACTIVE` with `now` counted as the last activity. Windows below
    /// [`MIN_IDLE_WINDOW`] are raised to it.
    pub fn new(idle_window: Duration, now: Instant) -> Self {
        Self {
            idle_window: idle_window.max(MIN_IDLE_WINDOW),
            last_activity: now,
            last_ping: None,
            state: HeartbeatState::Active,
        }
    }

    /// Current state.
    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    /// Time of the last inbound frame (or of creation).
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Configured idle window.
    pub fn idle_window(&self) -> Duration {
        self.idle_window
    }

    /// Record inbound traffic of any kind.
    pub fn record_inbound(&mut self, now: Instant) {
        if self.state == HeartbeatState::Dead {
            return;
        }
        self.last_activity = now;
        self.last_ping = None;
        self.state = HeartbeatState::Active;
    }

    /// Decide the next step at `now`.
    pub fn poll(&self, now: Instant) -> HeartbeatAction {
        if self.state == HeartbeatState::Dead {
            return HeartbeatAction::Close;
        }
        let since = self.last_ping.unwrap_or(self.last_activity);
        match since.checked_add(self.idle_window) {
            None => HeartbeatAction::Wait(FAR_FUTURE_WAIT),
            Some(deadline) if now >= deadline => HeartbeatAction::SendPing,
            Some(deadline) => HeartbeatAction::Wait(deadline - now),
        }
    }

    /// Record that a keep-alive ping was written successfully at `now`.
    pub fn ping_sent(&mut self, now: Instant) {
        if self.state == HeartbeatState::Dead {
            return;
        }
        self.last_ping = Some(now);
        self.state = HeartbeatState::IdlePingSent;
    }

    /// Record a transport failure. Terminal.
    pub fn mark_dead(&mut self) {
        self.state = HeartbeatState::Dead;
    }

    /// `true` once the connection is dead.
    pub fn is_dead(&self) -> bool {
        self.state == HeartbeatState::Dead
    }
}
