//! RPC data models and types

use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RPC error type
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Response(String),
}

impl From<reqwest::Error> for RpcError {
    fn from(e: reqwest::Error) -> Self {
        RpcError::Transport(e.to_string())
    }
}

/// A chain block reference used as a mining anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub hash: H256,
}

/// A transaction payload awaiting signature.
///
/// The orchestrator fills this in and hands it to the signing
/// collaborator, which returns raw broadcastable bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: H160,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// JSON-RPC 2.0 request envelope.
#[derive(Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

/// JSON-RPC 2.0 response envelope.
#[derive(Deserialize)]
pub(crate) struct JsonRpcResponse {
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Deserialize)]
pub(crate) struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Parse a `0x`-prefixed quantity into a U256.
pub fn u256_from_hex(s: &str) -> Result<U256, RpcError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() || digits.len() > 64 {
        return Err(RpcError::Response(format!("bad quantity: {s:?}")));
    }
    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_string()
    };
    let bytes =
        hex::decode(&padded).map_err(|_| RpcError::Response(format!("bad quantity: {s:?}")))?;
    Ok(U256::from_big_endian(&bytes))
}

/// Parse a `0x`-prefixed quantity into a u64.
pub fn u64_from_hex(s: &str) -> Result<u64, RpcError> {
    let v = u256_from_hex(s)?;
    if v > U256::from(u64::MAX) {
        return Err(RpcError::Response(format!("quantity too large: {s:?}")));
    }
    Ok(v.low_u64())
}

/// Parse a `0x`-prefixed 32-byte hash.
pub fn h256_from_hex(s: &str) -> Result<H256, RpcError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes =
        hex::decode(digits).map_err(|_| RpcError::Response(format!("bad hash: {s:?}")))?;
    if bytes.len() != 32 {
        return Err(RpcError::Response(format!("bad hash length: {s:?}")));
    }
    Ok(H256::from_slice(&bytes))
}

/// Canonical `0x` + 40 lowercase hex digit address rendering.
pub fn address_to_hex(a: H160) -> String {
    format!("0x{}", hex::encode(a.as_bytes()))
}

/// Canonical `0x` + 64 lowercase hex digit word rendering.
pub fn u256_to_hex64(v: U256) -> String {
    let mut bytes = [0u8; 32];
    v.to_big_endian(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}
