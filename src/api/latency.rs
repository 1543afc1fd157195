//! In-memory histogram of poll cycle wall time.
//! The poller records one sample per completed cycle; the API reads percentiles.

use std::sync::Mutex;
use std::time::Duration;

/// Shared cycle duration stats. Values stored in milliseconds.
pub struct CycleLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl CycleLatency {
    /// Tracks 1ms to 1h, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record_ms(&self, ms: u64) {
        if let Ok(mut h) = self.inner.lock() {
            h.saturating_record(ms.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.record_ms(ms);
    }

    /// Return (p50_ms, p95_ms, p99_ms). None if no samples.
    pub fn percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    /// Sample count.
    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for CycleLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        assert_eq!(CycleLatency::new().percentiles(), (None, None, None));
    }

    #[test]
    fn records_cycle_durations() {
        let stats = CycleLatency::new();
        for ms in [100, 200, 300, 400] {
            stats.record(Duration::from_millis(ms));
        }
        stats.record(Duration::ZERO);
        assert_eq!(stats.len(), 5);
        let (p50, _, p99) = stats.percentiles();
        assert!(p50.unwrap() >= 100 && p50.unwrap() <= 300);
        assert!(p99.unwrap() >= 399);
    }
}
