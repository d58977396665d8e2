//! Token-bucket admission control for the web front end.

use std::time::Instant;

/// Bucket holding up to `burst` request tokens, refilled continuously at
/// `per_minute / 60` tokens per second.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    burst: f64,
    per_second: f64,
    available: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// Full bucket, or `None` when either limit is zero (limiting disabled).
    pub fn new(per_minute: u32, burst: u32) -> Option<Self> {
        Self::starting_at(per_minute, burst, Instant::now())
    }

    fn starting_at(per_minute: u32, burst: u32, now: Instant) -> Option<Self> {
        (per_minute > 0 && burst > 0).then(|| Self {
            burst: f64::from(burst),
            per_second: f64::from(per_minute) / 60.0,
            available: f64::from(burst),
            refilled_at: now,
        })
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> bool {
        let earned = now.saturating_duration_since(self.refilled_at).as_secs_f64() * self.per_second;
        self.available = (self.available + earned).min(self.burst);
        self.refilled_at = now;
        if self.available < 1.0 {
            return false;
        }
        self.available -= 1.0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_limits_disable_limiting() {
        assert!(TokenBucket::new(0, 10).is_none());
        assert!(TokenBucket::new(60, 0).is_none());
    }

    #[test]
    fn burst_then_refill() {
        let start = Instant::now();
        let mut bucket = TokenBucket::starting_at(60, 2, start).unwrap();
        assert!(bucket.try_acquire_at(start));
        assert!(bucket.try_acquire_at(start));
        assert!(!bucket.try_acquire_at(start));
        // 60/min refills one token per second.
        assert!(!bucket.try_acquire_at(start + Duration::from_millis(500)));
        assert!(bucket.try_acquire_at(start + Duration::from_millis(1000)));
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let start = Instant::now();
        let mut bucket = TokenBucket::starting_at(600, 3, start).unwrap();
        let later = start + Duration::from_secs(3600);
        let granted = (0..10).filter(|_| bucket.try_acquire_at(later)).count();
        assert_eq!(granted, 3);
    }
}
