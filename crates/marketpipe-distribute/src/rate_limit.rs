//! Per-client token bucket.

use parking_lot::Mutex;
use std::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Continuous-refill token bucket. One per connected client.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// Consume one token if available.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_up_to_capacity_then_rejects() {
        let bucket = TokenBucket::new(3.0, 0.0);
        assert!(bucket.allow());
        assert!(bucket.allow());
        assert!(bucket.allow());
        assert!(!bucket.allow());
    }

    #[test]
    fn refill_restores_tokens() {
        let bucket = TokenBucket::new(1.0, 1_000_000.0);
        assert!(bucket.allow());
        // At a million tokens per second even a microsecond refills one.
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(bucket.allow());
    }
}
