//! Shared poller health for the /health endpoint.
//! Updated by the Poller, read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shared health metrics. Written by the poller, read by the API.
#[derive(Default)]
pub struct HealthState {
    /// True while a cycle is in flight.
    pub cycle_running: AtomicBool,
    /// Discovery failures since the last successful cycle.
    pub consecutive_failures: AtomicU32,
    /// Completed cycles (succeeded or failed) since process start.
    pub cycles_completed: AtomicU64,
    /// Microsecond UTC timestamp of the last successful cycle (0 = none).
    pub last_success_at_us: AtomicI64,
    /// Games updated by the last successful cycle.
    pub last_games_updated: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub cycle_running: bool,
    pub consecutive_failures: u32,
    pub cycles_completed: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_games_updated: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_cycle_running(&self, v: bool) {
        self.cycle_running.store(v, Ordering::Relaxed);
    }

    pub fn record_success(&self, at: DateTime<Utc>, games_updated: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_success_at_us
            .store(at.timestamp_micros(), Ordering::Relaxed);
        self.last_games_updated
            .store(games_updated as u64, Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, consecutive_failures: u32) {
        self.consecutive_failures
            .store(consecutive_failures, Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_us = self.last_success_at_us.load(Ordering::Relaxed);
        HealthSnapshot {
            cycle_running: self.cycle_running.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            last_success_at: (last_us != 0)
                .then(|| DateTime::from_timestamp_micros(last_us))
                .flatten(),
            last_games_updated: self.last_games_updated.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_failures() {
        let health = HealthState::new();
        assert!(health.snapshot().last_success_at.is_none());

        health.record_failure(1);
        health.record_failure(2);
        assert_eq!(health.snapshot().consecutive_failures, 2);

        let now = crate::types::truncate_to_micros(Utc::now());
        health.record_success(now, 3);
        let snap = health.snapshot();
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.cycles_completed, 3);
        assert_eq!(snap.last_success_at, Some(now));
        assert_eq!(snap.last_games_updated, 3);
    }
}
