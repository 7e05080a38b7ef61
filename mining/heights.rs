//! Per-target pow-height tracking
//!
//! The contract records a monotonic submission counter per
//! (submitter, recipients, splits) tuple; each proof must cite the
//! next unused height for its target. The cache is refreshed from
//! chain, advanced optimistically after each broadcast, and marked
//! stale when a broadcast fails so the height is re-read before the
//! key is used again.

use std::collections::{HashMap, HashSet};

use primitive_types::{H160, U256};
use rpc_core::abi;
use rpc_core::model::RpcError;
use rpc_core::ChainRpc;

/// Basis-point denominator for reward splits.
pub const SPLIT_DENOMINATOR: u64 = 10_000;

/// Identifies one pow-height counter on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub submitter: H160,
    pub miner: H160,
    pub tip: H160,
    pub split_numerator: u64,
    pub split_denominator: u64,
}

impl TargetKey {
    pub fn new(submitter: H160, miner: H160, tip: H160, split_bps: u64) -> Self {
        Self {
            submitter,
            miner,
            tip,
            split_numerator: split_bps,
            split_denominator: SPLIT_DENOMINATOR,
        }
    }

    /// Reward recipients in contract order: miner first, tip second.
    pub fn recipients(&self) -> [H160; 2] {
        [self.miner, self.tip]
    }

    /// Split values in contract order: miner remainder first, tip
    /// share second.
    pub fn splits(&self) -> [U256; 2] {
        [
            U256::from(self.split_denominator - self.split_numerator),
            U256::from(self.split_numerator),
        ]
    }
}

/// Cached submission heights, keyed by target.
#[derive(Default)]
pub struct PowHeightCache {
    heights: HashMap<TargetKey, u64>,
    stale: HashSet<TargetKey>,
}

impl PowHeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the authoritative height from chain and store it. This is
    /// the only operation allowed to lower a cached value.
    pub fn refresh(
        &mut self,
        key: &TargetKey,
        rpc: &dyn ChainRpc,
        contract: H160,
    ) -> Result<u64, RpcError> {
        let data = abi::pow_height_call(key.submitter, key.recipients(), key.splits());
        let ret = rpc.call(contract, data)?;
        let height = abi::decode_uint(&ret)?;
        if height > U256::from(u64::MAX) {
            return Err(RpcError::Response(format!("pow height out of range: {height}")));
        }
        let height = height.low_u64();
        self.heights.insert(*key, height);
        self.stale.remove(key);
        Ok(height)
    }

    /// Height the next submission for `key` must cite.
    pub fn next_height(&self, key: &TargetKey) -> u64 {
        self.heights.get(key).copied().unwrap_or(0) + 1
    }

    pub fn get(&self, key: &TargetKey) -> Option<u64> {
        self.heights.get(key).copied()
    }

    /// Optimistic local advance after a broadcast is handed off, so
    /// the key is not reused with a consumed height before the next
    /// refresh.
    pub fn bump(&mut self, key: &TargetKey) {
        *self.heights.entry(*key).or_insert(0) += 1;
    }

    /// Flag a key whose height may be wrong (failed broadcast); it
    /// must be refreshed before reuse.
    pub fn mark_stale(&mut self, key: &TargetKey) {
        self.stale.insert(*key);
    }

    pub fn is_stale(&self, key: &TargetKey) -> bool {
        self.stale.contains(key)
    }
}
