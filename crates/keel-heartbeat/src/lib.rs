//! Per-connection liveness supervision for Keel.
//!
//! A connection that stops acknowledging probes is declared dead after a
//! bounded retry budget: the supervisor ticks every `interval`, counts
//! consecutive missed replies, and reports exhaustion once the count
//! exceeds `retries`. Worst-case detection latency is
//! `(retries + 1) × interval`; an acknowledgement at any point resets the
//! budget.
//!
//! # Integration
//!
//! The supervisor owns only timing and counting — no I/O. The connection
//! layer drives it from a small task:
//!
//! ```ignore
//! let mut hb = HeartbeatSupervisor::new(config);
//! let pulse = hb.pulse();          // handed to the Net handler
//! loop {
//!     match hb.tick().await {
//!         Probe::Send { .. } => out_tx.send(probe_frame.clone())?,
//!         Probe::Exhausted => {
//!             // One last probe goes out with the close, so a quiet
//!             // peer sees retries + 1 probes before EOF.
//!             let _ = out_tx.send(probe_frame.clone());
//!             return close(CloseReason::HeartbeatTimeout);
//!         }
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant, Interval, MissedTickBehavior};
use tracing::trace;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing parameters for the liveness protocol.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between probes.
    pub interval: Duration,
    /// How many consecutive missed replies are tolerated before the peer
    /// is declared dead. A longer budget trades detection latency against
    /// false positives from transient stalls.
    pub retries: u32,
    /// Random jitter (0–max µs) added to the *first* probe to
    /// desynchronize connections accepted at the same instant.
    pub initial_jitter_us: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            retries: 3,
            initial_jitter_us: 2_000, // 0–2 ms default jitter
        }
    }
}

impl HeartbeatConfig {
    /// Config with a given interval and retry budget, no first-probe jitter.
    pub fn new(interval: Duration, retries: u32) -> Self {
        Self {
            interval,
            retries,
            initial_jitter_us: 0,
        }
    }

    /// Worst-case time from the last acknowledgement (or connection
    /// start) until a dead peer is detected.
    pub fn detection_window(&self) -> Duration {
        self.interval * (self.retries + 1)
    }
}

// ---------------------------------------------------------------------------
// Pulse
// ---------------------------------------------------------------------------

/// Handle for acknowledging liveness from outside the supervisor task.
///
/// Cheap to clone; the Net handler holds one per connection and calls
/// [`Pulse::beat`] whenever a heartbeat acknowledgement frame arrives.
/// The counter is a plain atomic, so the reset needs no channel hop and
/// cannot race the supervisor into a wrong close decision by more than
/// one tick either way.
#[derive(Debug, Clone)]
pub struct Pulse {
    missed: Arc<AtomicU32>,
}

impl Pulse {
    /// Resets the missed-probe counter to zero.
    pub fn beat(&self) {
        self.missed.store(0, Ordering::Relaxed);
    }

    /// Current number of consecutive unacknowledged probes.
    pub fn missed(&self) -> u32 {
        self.missed.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Outcome of one supervisor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The retry budget still has room: send a probe frame.
    Send {
        /// Consecutive probes without an acknowledgement, this one
        /// included.
        missed: u32,
    },
    /// The budget is exhausted: the peer is dead. The caller sends the
    /// final probe of the sequence and closes the connection.
    Exhausted,
}

/// The per-connection liveness timer.
///
/// Lazily arms its interval on the first [`tick`](Self::tick) so that
/// the detection window is measured from when the connection actually
/// starts listening, not from construction.
pub struct HeartbeatSupervisor {
    config: HeartbeatConfig,
    missed: Arc<AtomicU32>,
    timer: Option<Interval>,
    ticks: u64,
}

impl HeartbeatSupervisor {
    /// Creates a supervisor with a fresh (zero) missed counter.
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            missed: Arc::new(AtomicU32::new(0)),
            timer: None,
            ticks: 0,
        }
    }

    /// Returns an acknowledgement handle sharing this supervisor's
    /// counter.
    pub fn pulse(&self) -> Pulse {
        Pulse {
            missed: Arc::clone(&self.missed),
        }
    }

    /// The configuration this supervisor was built with.
    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Waits for the next probe deadline and charges it against the
    /// retry budget.
    ///
    /// Returns [`Probe::Send`] while the budget lasts and
    /// [`Probe::Exhausted`] on the tick where the count first exceeds
    /// `retries` — which is no earlier than `retries × interval` and no
    /// later than `(retries + 1) × interval` after the last
    /// acknowledgement.
    pub async fn tick(&mut self) -> Probe {
        let config = &self.config;
        let timer = self.timer.get_or_insert_with(|| {
            let jitter = if config.initial_jitter_us > 0 {
                let us = rand::rng().random_range(0..=config.initial_jitter_us);
                Duration::from_micros(us)
            } else {
                Duration::ZERO
            };
            let mut timer = time::interval_at(
                TokioInstant::now() + config.interval + jitter,
                config.interval,
            );
            // A stalled executor must not burst-fire probes and burn the
            // whole budget in one go.
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        timer.tick().await;
        self.ticks += 1;

        let missed = self.missed.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(missed, tick = self.ticks, "heartbeat tick");

        if missed > self.config.retries {
            Probe::Exhausted
        } else {
            Probe::Send { missed }
        }
    }
}
