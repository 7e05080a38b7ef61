//! Unbounded retry with jittered exponential backoff
//!
//! Used for chain-state synchronization where giving up is not an
//! option; the caller decides when to stop retrying via the abort
//! probe.

use std::thread;
use std::time::Duration;

use rand::Rng;

/// Backoff parameters for [`RetryPolicy::retry`].
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 200,
            max_backoff_ms: 60_000,
        }
    }
}

/// Backoff sleeps are sliced so an abort request takes effect quickly
/// even at the 60 s ceiling.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

impl RetryPolicy {
    /// Un-jittered backoff after `failures` consecutive failures,
    /// doubling from the initial value and held at the ceiling.
    pub fn backoff_ms(&self, failures: u32) -> u64 {
        let doubled = self
            .initial_backoff_ms
            .saturating_mul(1u64.checked_shl(failures.min(32)).unwrap_or(u64::MAX));
        doubled.min(self.max_backoff_ms)
    }

    /// Invoke `op` until it succeeds, sleeping a jittered backoff
    /// between attempts. Returns `None` only if `abort` reported true,
    /// which the orchestrator wires to its shutdown signal.
    pub fn retry<T, E, F, A>(&self, label: &str, abort: A, mut op: F) -> Option<T>
    where
        E: std::fmt::Display,
        F: FnMut() -> Result<T, E>,
        A: Fn() -> bool,
    {
        let mut failures: u32 = 0;
        loop {
            if abort() {
                return None;
            }
            if failures > 0 {
                log::warn!("attempting to {} ({} failed attempts)", label, failures);
            }
            match op() {
                Ok(value) => return Some(value),
                Err(e) => {
                    log::debug!("{} failed: {}", label, e);
                    let backoff = self.backoff_ms(failures);
                    failures = failures.saturating_add(1);
                    let jitter = 0.75 + 0.25 * rand::thread_rng().gen::<f64>();
                    let mut remaining = Duration::from_millis(backoff).mul_f64(jitter);
                    while !remaining.is_zero() {
                        if abort() {
                            return None;
                        }
                        let slice = remaining.min(SLEEP_SLICE);
                        thread::sleep(slice);
                        remaining -= slice;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 8,
        }
    }

    #[test]
    fn failing_k_times_invokes_k_plus_one() {
        let mut calls = 0;
        let result = fast_policy().retry("test op", || false, || {
            calls += 1;
            if calls <= 3 {
                Err("nope")
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result, Some(4));
        assert_eq!(calls, 4);
    }

    #[test]
    fn backoff_doubles_to_ceiling_and_holds() {
        let policy = RetryPolicy {
            initial_backoff_ms: 200,
            max_backoff_ms: 60_000,
        };
        let delays: Vec<u64> = (0..12).map(|k| policy.backoff_ms(k)).collect();
        assert_eq!(delays[0], 200);
        assert_eq!(delays[1], 400);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays[10], 60_000);
        assert_eq!(delays[11], 60_000);
        // no overflow at absurd failure counts
        assert_eq!(policy.backoff_ms(u32::MAX), 60_000);
    }

    #[test]
    fn abort_stops_retrying() {
        let calls = std::cell::Cell::new(0u32);
        let result: Option<()> = fast_policy().retry(
            "doomed op",
            || calls.get() >= 2,
            || {
                calls.set(calls.get() + 1);
                Err::<(), _>("always fails")
            },
        );
        assert_eq!(result, None);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn immediate_success_does_not_sleep() {
        let result = RetryPolicy::default().retry("quick op", || false, || Ok::<_, &str>(7));
        assert_eq!(result, Some(7));
    }
}
