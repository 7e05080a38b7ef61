//! Chain-view abstraction for the mining orchestrator
//!
//! This crate defines the blocking RPC surface the orchestrator consumes
//! ([`ChainRpc`]), an HTTP JSON-RPC 2.0 implementation of it, the ABI
//! helpers for the incentive contract, the signing collaborator contract
//! ([`TransactionSigner`]) and a best-effort fee oracle.

pub mod abi;
pub mod api;
pub mod client;
pub mod fee;
pub mod model;
pub mod signer;

pub use api::ChainRpc;
pub use client::HttpRpcClient;
pub use fee::FeeOracle;
pub use model::{BlockRef, RpcError, UnsignedTransaction};
pub use signer::{SignerError, TransactionSigner};
