//! Tip-recipient selection and rotation
//!
//! Each miner deterministically ranks the candidate recipient set by
//! keccak-256 of (miner address, candidate address) and works the
//! first K entries. No central assignment authority: any party can
//! reproduce the ranking from the two addresses alone.

use primitive_types::{H160, H256};
use rand::Rng;
use rpc_core::abi::keccak256;

/// Number of candidates a miner actively rotates across.
pub const ACTIVE_SUBSET_SIZE: usize = 3;

/// Deterministic, address-keyed selection over a fixed candidate set.
#[derive(Clone, Debug)]
pub struct TipSelector {
    subset: Vec<H160>,
    active: usize,
}

impl TipSelector {
    /// Rank `candidates` for `miner` and keep the first
    /// [`ACTIVE_SUBSET_SIZE`] as the active subset. The starting index
    /// is randomized per run so restarts do not always hammer the same
    /// recipient first.
    pub fn new(miner: H160, candidates: &[H160]) -> Self {
        let subset = Self::rank(miner, candidates)
            .into_iter()
            .take(ACTIVE_SUBSET_SIZE)
            .collect::<Vec<_>>();
        let active = if subset.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..subset.len())
        };
        Self { subset, active }
    }

    /// Full deterministic ranking: ascending sort key, candidate index
    /// as tie-break.
    pub fn rank(miner: H160, candidates: &[H160]) -> Vec<H160> {
        let mut keyed: Vec<(H256, usize)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (Self::sort_key(miner, *c), i))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, i)| candidates[i]).collect()
    }

    fn sort_key(miner: H160, candidate: H160) -> H256 {
        let mut data = [0u8; 40];
        data[..20].copy_from_slice(miner.as_bytes());
        data[20..].copy_from_slice(candidate.as_bytes());
        H256::from(keccak256(&data))
    }

    /// Currently active tip recipient.
    pub fn active(&self) -> Option<H160> {
        self.subset.get(self.active).copied()
    }

    /// Advance round-robin; called after every successful proof
    /// broadcast to spread submissions across the subset.
    pub fn rotate(&mut self) {
        if !self.subset.is_empty() {
            self.active = (self.active + 1) % self.subset.len();
        }
    }

    pub fn subset(&self) -> &[H160] {
        &self.subset
    }
}
