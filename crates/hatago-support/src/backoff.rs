//! Restart backoff with jitter.
//!
//! `delay = min(max, initial * 2^(restart_count - 1)) * jitter[0.5, 1.0)`
//!
//! The workspace carries no dependency on `rand`, so the jitter source here
//! is a small splitmix64 generator seeded from the wall clock and an atomic
//! counter. It only needs to avoid thundering-herd restarts, not resist
//! prediction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

static SEED_COUNTER: AtomicU64 = AtomicU64::new(0);

fn splitmix64_next(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// A float uniformly distributed in `[0.5, 1.0)`.
fn jitter_factor() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut state = nanos ^ counter.wrapping_mul(0xD6E8FEB86659FD93);
    let raw = splitmix64_next(&mut state);
    // Top 53 bits -> [0, 1.0) double, then rescale to [0.5, 1.0).
    let unit = (raw >> 11) as f64 / (1u64 << 53) as f64;
    0.5 + unit * 0.5
}

/// Compute the delay before the `restart_count`-th restart attempt
/// (1-indexed: the first restart uses `restart_count == 1`).
pub fn compute_delay(restart_count: u32, initial: Duration, max: Duration) -> Duration {
    if restart_count == 0 {
        return Duration::ZERO;
    }
    let exponent = restart_count.saturating_sub(1).min(32);
    let scaled = initial.as_secs_f64() * 2f64.powi(exponent as i32);
    let capped = scaled.min(max.as_secs_f64());
    let jittered = capped * jitter_factor();
    Duration::from_secs_f64(jittered.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_restart_is_near_initial_delay() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        let delay = compute_delay(1, initial, max);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= initial);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let initial = Duration::from_secs(1);
        let max = Duration::from_secs(30);
        let delay = compute_delay(20, initial, max);
        assert!(delay <= max);
        assert!(delay >= max.mul_f64(0.5));
    }

    #[test]
    fn zero_restarts_has_no_delay() {
        assert_eq!(
            compute_delay(0, Duration::from_secs(1), Duration::from_secs(30)),
            Duration::ZERO
        );
    }

    #[test]
    fn jitter_varies_across_calls() {
        let initial = Duration::from_secs(10);
        let max = Duration::from_secs(30);
        let samples: Vec<_> = (0..8).map(|_| compute_delay(2, initial, max)).collect();
        assert!(samples.windows(2).any(|w| w[0] != w[1]));
    }
}
