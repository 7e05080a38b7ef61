//! Difficulty and work-budget controller
//!
//! Converts the estimated hashrate and the target proof period into a
//! search difficulty and a per-cycle work budget for the compute
//! engine. Recomputed after every terminal engine response, so the
//! difficulty tracks recent throughput rather than a long-term
//! average.

use primitive_types::U256;

/// Per-request work parameters handed to the compute engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkBudget {
    /// Acceptance threshold: a candidate hash at or below this value
    /// is a proof. Lower is harder.
    pub difficulty: U256,
    /// Nonces each engine thread scans between synchronization points
    /// (budgets two engine syncs per second).
    pub thread_iterations: u64,
    /// Total hashes to attempt before reporting exhaustion (one minute
    /// of search, bounding restart/report overhead).
    pub hash_limit: u64,
}

/// Maps observed hashrate to a work budget.
#[derive(Clone, Copy, Debug)]
pub struct DifficultyController {
    proof_period_secs: u64,
    cores: usize,
}

impl DifficultyController {
    pub fn new(proof_period_secs: u64, cores: usize) -> Self {
        Self {
            proof_period_secs: proof_period_secs.max(1),
            cores: cores.max(1),
        }
    }

    /// Recompute the budget from the current hashrate estimate.
    pub fn recalculate(&self, rate: f64) -> WorkBudget {
        let hashrate = (rate.max(1.0) as u64).max(1);
        let denominator = U256::from(hashrate) * U256::from(self.proof_period_secs);
        WorkBudget {
            difficulty: U256::MAX / denominator,
            thread_iterations: (hashrate / (2 * self.cores as u64)).max(1),
            hash_limit: hashrate.saturating_mul(60),
        }
    }
}
