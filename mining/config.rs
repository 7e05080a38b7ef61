//! Orchestrator configuration

use std::path::PathBuf;
use std::time::Duration;

use primitive_types::H160;

use crate::gas::GasConfig;
use crate::heights::SPLIT_DENOMINATOR;

/// Configuration for the mining orchestrator.
#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Reward recipient address.
    pub miner: H160,
    /// Account that signs and sends proof transactions.
    pub submitter: H160,
    /// Incentive contract address.
    pub contract: H160,
    /// Candidate tip recipients; the active subset is derived from
    /// these and the miner address.
    pub tip_candidates: Vec<H160>,
    /// Tip share in basis points (out of 10000).
    pub tip_split_bps: u64,
    /// Desired average seconds between proofs.
    pub proof_period_secs: u64,
    /// Base interval of the background chain-sync loop.
    pub sync_interval: Duration,
    /// Blocks behind head used as the mining anchor, reducing
    /// invalidation from reorgs.
    pub confirmation_lag: u64,
    /// Path to the compute-engine binary.
    pub engine_path: PathBuf,
    /// Engine worker threads assumed by the budget calculation.
    pub cores: usize,
    /// Seed for the hashrate estimate before the first report.
    pub initial_hashrate: f64,
    /// Gas-price policy parameters.
    pub gas: GasConfig,
    /// Gas limit for proof transactions.
    pub gas_limit: u64,
    /// Chain id for replay-protected signing.
    pub chain_id: u64,
    /// Optional speed-tier fee estimate endpoint.
    pub fee_oracle_url: Option<String>,
    /// Tier field to read from the fee estimate.
    pub fee_oracle_tier: String,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            miner: H160::zero(),
            submitter: H160::zero(),
            contract: H160::zero(),
            tip_candidates: Vec::new(),
            tip_split_bps: 500,
            proof_period_secs: 86_400,
            sync_interval: Duration::from_secs(60),
            confirmation_lag: 6,
            engine_path: PathBuf::from("bin/pow_engine"),
            cores: num_cpus::get(),
            initial_hashrate: 1_000_000.0,
            gas: GasConfig::default(),
            gas_limit: 500_000,
            chain_id: 1,
            fee_oracle_url: None,
            fee_oracle_tier: "fast".to_string(),
        }
    }
}

impl MinerConfig {
    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.contract.is_zero() {
            return Err("contract address is not set".into());
        }
        if self.miner.is_zero() {
            return Err("miner address is not set".into());
        }
        if self.tip_candidates.is_empty() {
            return Err("no tip candidates configured".into());
        }
        if self.tip_split_bps > SPLIT_DENOMINATOR {
            return Err(format!(
                "tip split {} exceeds {} basis points",
                self.tip_split_bps, SPLIT_DENOMINATOR
            ));
        }
        if self.proof_period_secs == 0 {
            return Err("proof period must be positive".into());
        }
        if self.cores == 0 {
            return Err("core count must be positive".into());
        }
        Ok(())
    }
}
