use std::time::Duration;

use tokio::time::Instant;

/// Consecutive failure counter with a throttled recovery mode
#[derive(Debug, Clone)]
pub struct FailureTracker {
    threshold: u32,
    spacing: Duration,
    consecutive: u32,
    recovery: bool,
    last_attempt: Option<Instant>,
}

impl FailureTracker {
    pub fn new(threshold: u32, spacing: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            spacing,
            consecutive: 0,
            recovery: false,
            last_attempt: None,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn in_recovery(&self) -> bool {
        self.recovery
    }

    pub fn record_success(&mut self) {
        if self.recovery {
            info!(failures = self.consecutive, "leaving recovery mode");
        }

        self.consecutive = 0;
        self.recovery = false;
    }

    /// Count a failure, returns true when it starts recovery mode
    pub fn record_failure(&mut self) -> bool {
        self.consecutive += 1;

        if !self.recovery && self.consecutive >= self.threshold {
            warn!(failures = self.consecutive, "entering recovery mode");
            self.recovery = true;
            return true;
        }

        false
    }

    /// Hold or dwell duration, doubled in recovery mode
    pub fn dwell(&self, base: Duration) -> Duration {
        if self.recovery {
            base * 2
        } else {
            base
        }
    }

    /// Time left before the next attempt is allowed
    pub fn throttle_delay(&self, now: Instant) -> Option<Duration> {
        if !self.recovery {
            return None;
        }

        let next = self.last_attempt? + self.spacing;
        if next > now {
            Some(next - now)
        } else {
            None
        }
    }

    /// Wait until the next attempt is allowed and record it
    pub async fn throttle(&mut self) {
        if let Some(delay) = self.throttle_delay(Instant::now()) {
            trace!(delay = ?delay, "throttling in recovery mode");
            tokio::time::sleep(delay).await;
        }

        self.last_attempt = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_enters_recovery() {
        let mut tracker = FailureTracker::new(3, Duration::from_secs(5));

        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(tracker.in_recovery());
        assert!(!tracker.record_failure());
        assert_eq!(tracker.consecutive(), 4);
        assert_eq!(tracker.dwell(Duration::from_secs(5)), Duration::from_secs(10));

        tracker.record_success();
        assert!(!tracker.in_recovery());
        assert_eq!(tracker.consecutive(), 0);
        assert_eq!(tracker.dwell(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_throttles_attempts() {
        let mut tracker = FailureTracker::new(1, Duration::from_secs(5));

        tracker.throttle().await;
        let start = Instant::now();
        tracker.throttle().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        tracker.record_failure();
        tracker.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        tracker.record_success();
        tracker.throttle().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
