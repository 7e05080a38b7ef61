//! Hashrate estimation
//!
//! A 2-sample exponential moving average: it reacts faster than it
//! smooths, which is the right trade-off when proof intervals are long
//! relative to report frequency.

/// Exponential moving average of observed hash throughput.
#[derive(Clone, Copy, Debug)]
pub struct HashrateEstimator {
    rate: f64,
}

impl HashrateEstimator {
    /// Start from zero; the first sample becomes the estimate.
    pub fn new() -> Self {
        Self { rate: 0.0 }
    }

    /// Seed the estimate, used so the first work request carries a
    /// sane budget instead of a degenerate one.
    pub fn seeded(initial_rate: f64) -> Self {
        Self {
            rate: initial_rate.max(0.0),
        }
    }

    /// Fold in an observation of `delta_hashes` over `delta_ms`
    /// milliseconds and return the updated estimate in H/s.
    pub fn update(&mut self, delta_hashes: u64, delta_ms: u64) -> f64 {
        let delta_ms = delta_ms.max(1);
        let sample = delta_hashes as f64 * 1000.0 / delta_ms as f64;
        self.rate = if self.rate > 0.0 {
            (self.rate + sample) / 2.0
        } else {
            sample
        };
        self.rate
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Default for HashrateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable hashrate.
pub fn format_hashrate(rate: f64) -> String {
    const UNITS: [&str; 5] = ["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];
    let mut value = rate.max(0.0);
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
