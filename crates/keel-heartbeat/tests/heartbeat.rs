//! Timing tests for the heartbeat supervisor.
//!
//! Uses `tokio::test(start_paused = true)` so the clock only moves when
//! the runtime has nothing left to poll — probe deadlines resolve
//! instantly and deterministically.

use std::time::Duration;

use keel_heartbeat::{HeartbeatConfig, HeartbeatSupervisor, Probe};
use tokio::time::Instant;

const T: Duration = Duration::from_secs(5);

fn config(retries: u32) -> HeartbeatConfig {
    HeartbeatConfig::new(T, retries)
}

#[tokio::test(start_paused = true)]
async fn test_first_probe_fires_after_one_interval() {
    let mut sup = HeartbeatSupervisor::new(config(3));
    let start = Instant::now();

    let probe = sup.tick().await;

    assert_eq!(probe, Probe::Send { missed: 1 });
    assert_eq!(start.elapsed(), T);
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_exhausts_within_bounds() {
    // With retries = R, a peer that never acks must be declared dead no
    // earlier than R×T and no later than (R+1)×T after start.
    let retries = 3;
    let mut sup = HeartbeatSupervisor::new(config(retries));
    let start = Instant::now();

    let mut probes_sent = 0;
    let exhausted_at = loop {
        match sup.tick().await {
            Probe::Send { .. } => probes_sent += 1,
            Probe::Exhausted => break start.elapsed(),
        }
    };

    assert_eq!(probes_sent, retries);
    assert!(exhausted_at >= T * retries, "closed too early: {exhausted_at:?}");
    assert!(
        exhausted_at <= T * (retries + 1),
        "closed too late: {exhausted_at:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_missed_count_increments_per_probe() {
    let mut sup = HeartbeatSupervisor::new(config(5));

    for expected in 1..=5 {
        let probe = sup.tick().await;
        assert_eq!(probe, Probe::Send { missed: expected });
    }
    assert_eq!(sup.tick().await, Probe::Exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_ack_resets_the_budget() {
    let retries = 2;
    let mut sup = HeartbeatSupervisor::new(config(retries));
    let pulse = sup.pulse();

    // Burn two of the probes, then the peer acknowledges.
    assert_eq!(sup.tick().await, Probe::Send { missed: 1 });
    assert_eq!(sup.tick().await, Probe::Send { missed: 2 });
    pulse.beat();
    let reset_at = Instant::now();

    // The full budget is available again from the ack.
    let mut probes_sent = 0;
    let exhausted_at = loop {
        match sup.tick().await {
            Probe::Send { .. } => probes_sent += 1,
            Probe::Exhausted => break reset_at.elapsed(),
        }
    };

    assert_eq!(probes_sent, retries);
    assert!(exhausted_at >= T * retries);
    assert!(exhausted_at <= T * (retries + 1));
}

#[tokio::test(start_paused = true)]
async fn test_ack_before_every_probe_never_exhausts() {
    let mut sup = HeartbeatSupervisor::new(config(1));
    let pulse = sup.pulse();

    // A well-behaved peer: one ack per probe, indefinitely.
    for _ in 0..20 {
        let probe = sup.tick().await;
        assert_eq!(probe, Probe::Send { missed: 1 });
        pulse.beat();
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_closes_on_first_tick() {
    // retries = 0 tolerates no missed reply at all: the first tick
    // without an ack is already fatal, matching detection_window().
    let mut sup = HeartbeatSupervisor::new(config(0));
    let start = Instant::now();

    assert_eq!(sup.tick().await, Probe::Exhausted);
    assert_eq!(start.elapsed(), T);
    assert_eq!(config(0).detection_window(), T);
}

#[tokio::test(start_paused = true)]
async fn test_probes_are_evenly_spaced() {
    let mut sup = HeartbeatSupervisor::new(config(10));
    let mut last = Instant::now();

    for _ in 0..4 {
        sup.tick().await;
        assert_eq!(last.elapsed(), T);
        last = Instant::now();
    }
}
