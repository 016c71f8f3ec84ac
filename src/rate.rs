use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Baseline {
    key: String,
    value: u64,
    at: Instant,
}

/// Turns samples of a monotonically increasing counter into a per-second rate.
///
/// Only one key is tracked at a time. Switching keys (for example when the
/// busiest network interface changes) starts a new baseline instead of
/// computing a rate across two unrelated counters.
#[derive(Debug, Clone, Default)]
pub struct RateTracker {
    last: Option<Baseline>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, key: &str, value: u64, at: Instant) -> Option<f64> {
        let rate = match &self.last {
            Some(prev) if prev.key == key && value >= prev.value => {
                let elapsed = at.saturating_duration_since(prev.at).as_secs_f64();
                if elapsed > 0.0 {
                    Some((value - prev.value) as f64 / elapsed)
                } else {
                    None
                }
            }
            _ => None,
        };

        self.last = Some(Baseline {
            key: key.to_string(),
            value,
            at,
        });
        rate
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_sample_has_no_rate() {
        let mut tracker = RateTracker::new();
        assert_eq!(tracker.sample("eth0", 1000, Instant::now()), None);
    }

    #[test]
    fn computes_bytes_per_second() {
        let mut tracker = RateTracker::new();
        let t0 = Instant::now();
        tracker.sample("eth0", 1000, t0);
        let rate = tracker.sample("eth0", 3000, t0 + Duration::from_secs(2));
        assert_eq!(rate, Some(1000.0));
    }

    #[test]
    fn key_change_resets_baseline() {
        let mut tracker = RateTracker::new();
        let t0 = Instant::now();
        tracker.sample("eth0", 1000, t0);
        tracker.sample("eth0", 3000, t0 + Duration::from_secs(2));
        assert_eq!(
            tracker.sample("wlan0", 50, t0 + Duration::from_secs(3)),
            None
        );
        assert_eq!(
            tracker.sample("wlan0", 150, t0 + Duration::from_secs(4)),
            Some(100.0)
        );
    }

    #[test]
    fn counter_reset_yields_no_rate() {
        let mut tracker = RateTracker::new();
        let t0 = Instant::now();
        tracker.sample("eth0", 5000, t0);
        assert_eq!(tracker.sample("eth0", 10, t0 + Duration::from_secs(1)), None);
        assert_eq!(
            tracker.sample("eth0", 110, t0 + Duration::from_secs(2)),
            Some(100.0)
        );
    }

    #[test]
    fn zero_elapsed_yields_no_rate() {
        let mut tracker = RateTracker::new();
        let t0 = Instant::now();
        tracker.sample("eth0", 1000, t0);
        assert_eq!(tracker.sample("eth0", 2000, t0), None);
    }
}
