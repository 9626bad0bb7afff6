//! Exponential backoff with jitter for the invoker's retry loop (spec §4.3:
//! initial 50ms, factor 2, cap 2s, full jitter of ±25%).

use std::time::Duration;

use rand::Rng;

const INITIAL: Duration = Duration::from_millis(50);
const FACTOR: u32 = 2;
const CAP: Duration = Duration::from_secs(2);
const JITTER_FRACTION: f64 = 0.25;

/// An iterator of backoff delays: `50ms, 100ms, 200ms, ...` capped at `2s`,
/// each jittered by up to ±25% to avoid thundering-herd retries across
/// concurrent callers.
pub struct Backoff {
    next: Duration,
    attempt: u32,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(max_attempts: u32) -> Self {
        Self { next: INITIAL, attempt: 0, max_attempts }
    }

    /// Delay for the given attempt number (0-indexed), without jitter.
    fn base_delay(attempt: u32) -> Duration {
        let millis = INITIAL.as_millis() as u64 * FACTOR.pow(attempt) as u64;
        Duration::from_millis(millis).min(CAP)
    }

    fn jittered(base: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter: f64 = rng.gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
        let millis = base.as_millis() as f64 * (1.0 + jitter);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let base = Self::base_delay(self.attempt);
        self.attempt += 1;
        self.next = base;
        Some(Self::jittered(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_exactly_max_attempts_delays() {
        let delays: Vec<_> = Backoff::new(4).collect();
        assert_eq!(delays.len(), 4);
    }

    #[test]
    fn delays_stay_within_jittered_bounds_and_respect_cap() {
        for attempt in 0..6u32 {
            let base = Backoff::base_delay(attempt);
            assert!(base <= CAP);
        }
        let mut backoff = Backoff::new(8);
        for attempt in 0..8u32 {
            let base = Backoff::base_delay(attempt);
            let lower = (base.as_millis() as f64 * 0.75) as u64;
            let upper = (base.as_millis() as f64 * 1.25) as u64 + 1;
            let delay = backoff.next().unwrap();
            assert!(delay.as_millis() as u64 >= lower && delay.as_millis() as u64 <= upper);
        }
    }

    #[test]
    fn zero_max_attempts_yields_nothing() {
        assert_eq!(Backoff::new(0).count(), 0);
    }
}
