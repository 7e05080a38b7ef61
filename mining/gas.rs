//! Gas-price policy
//!
//! Computes a bounded gas price from the network price, a configured
//! multiplier, an optional external speed-tier hint and configured
//! floors/ceilings. A ceiling violation is a distinguishable error,
//! not a silently clamped quote: the caller decides whether to skip
//! the submission.

use primitive_types::U256;
use rpc_core::model::RpcError;
use rpc_core::{ChainRpc, FeeOracle};
use thiserror::Error;

const WEI_PER_GWEI: u64 = 1_000_000_000;

#[derive(Error, Debug)]
pub enum GasPriceError {
    #[error("gas price {gwei} gwei exceeds configured limit {ceiling_gwei} gwei")]
    LimitExceeded { gwei: u64, ceiling_gwei: u64 },

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
}

/// Gas-price policy parameters.
#[derive(Clone, Debug)]
pub struct GasConfig {
    /// Applied to the network price before comparing against hints.
    pub multiplier: f64,
    /// Quotes are raised to at least this price.
    pub floor_gwei: u64,
    /// Quotes above this price are a limit violation.
    pub ceiling_gwei: u64,
    /// Absolute per-transaction cap in wei (ceiling expressed in the
    /// chain's base unit; checked independently of the gwei ceiling).
    pub cap_wei: U256,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.1,
            floor_gwei: 1,
            ceiling_gwei: 1_000,
            cap_wei: U256::from(1_000u64) * U256::from(WEI_PER_GWEI),
        }
    }
}

/// A priced quote ready for transaction construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasQuote {
    pub wei: U256,
    pub gwei: u64,
}

/// Computes bounded gas quotes.
#[derive(Clone, Debug)]
pub struct GasPricePolicy {
    config: GasConfig,
}

impl GasPricePolicy {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    /// Quote a gas price. The oracle is best-effort: its absence or
    /// failure never fails the quote.
    pub fn quote(
        &self,
        rpc: &dyn ChainRpc,
        oracle: Option<&FeeOracle>,
    ) -> Result<GasQuote, GasPriceError> {
        let base_wei = rpc.gas_price()?;
        self.bounded(wei_to_gwei(base_wei), oracle.and_then(FeeOracle::tier_gwei))
    }

    /// Apply multiplier, hint, floor and ceiling to a base price.
    fn bounded(&self, base_gwei: f64, hint: Option<u64>) -> Result<GasQuote, GasPriceError> {
        let mut gwei = (base_gwei * self.config.multiplier).round() as u64;

        if let Some(hint) = hint {
            if hint > gwei {
                log::debug!("fee oracle hint {hint} gwei above multiplied price {gwei} gwei");
                gwei = hint;
            }
        }

        gwei = gwei.max(self.config.floor_gwei);
        let wei = U256::from(gwei) * U256::from(WEI_PER_GWEI);

        if gwei > self.config.ceiling_gwei || wei > self.config.cap_wei {
            return Err(GasPriceError::LimitExceeded {
                gwei,
                ceiling_gwei: self.config.ceiling_gwei,
            });
        }
        Ok(GasQuote { wei, gwei })
    }
}

fn wei_to_gwei(wei: U256) -> f64 {
    // Gas prices are far below 2^128 wei in practice; saturate rather
    // than wrap if an endpoint returns garbage.
    let capped = wei.min(U256::from(u128::MAX));
    capped.as_u128() as f64 / WEI_PER_GWEI as f64
}
