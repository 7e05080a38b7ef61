//! RPC API trait definitions

use primitive_types::{H160, H256, U256};

use crate::model::{BlockRef, RpcError};

/// Blocking chain-view trait consumed by the mining orchestrator.
///
/// All calls are synchronous; recovery from transient failures is the
/// caller's concern (retry with backoff), not the transport's.
pub trait ChainRpc: Send + Sync {
    /// Current head of the chain.
    fn latest_block(&self) -> Result<BlockRef, RpcError>;

    /// Block at the given height.
    fn block_by_number(&self, number: u64) -> Result<BlockRef, RpcError>;

    /// Current network gas price in wei.
    fn gas_price(&self) -> Result<U256, RpcError>;

    /// Pending-state transaction count for an account (next tx nonce).
    fn transaction_count(&self, address: H160) -> Result<U256, RpcError>;

    /// Read-only contract call; returns the raw return data.
    fn call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, RpcError>;

    /// Broadcast a signed transaction, returning its hash.
    fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, RpcError>;

    /// Chain identifier used for replay-protected signing.
    fn chain_id(&self) -> Result<u64, RpcError>;
}
