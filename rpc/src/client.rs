//! HTTP JSON-RPC 2.0 client

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use primitive_types::{H160, H256, U256};
use serde_json::{json, Value};

use crate::api::ChainRpc;
use crate::model::{
    address_to_hex, h256_from_hex, u256_from_hex, u64_from_hex, BlockRef, JsonRpcRequest,
    JsonRpcResponse, RpcError,
};

/// Default per-call timeout; retries mask slow endpoints, the timeout
/// just bounds how long a single call can stall the cycle.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking JSON-RPC client over HTTP.
pub struct HttpRpcClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    /// Create a client with the default per-call timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RpcError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit per-call timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        log::trace!("rpc -> {} (id {})", method, id);
        let response: JsonRpcResponse = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()?
            .json()?;
        if let Some(err) = response.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| RpcError::Response(format!("{method}: missing result")))
    }

    fn block_from_value(v: Value) -> Result<BlockRef, RpcError> {
        let number = v
            .get("number")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Response("block without number".into()))?;
        let hash = v
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Response("block without hash".into()))?;
        Ok(BlockRef {
            number: u64_from_hex(number)?,
            hash: h256_from_hex(hash)?,
        })
    }

    fn str_result(v: Value, what: &str) -> Result<String, RpcError> {
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Response(format!("{what}: non-string result")))
    }
}

impl ChainRpc for HttpRpcClient {
    fn latest_block(&self) -> Result<BlockRef, RpcError> {
        let v = self.request("eth_getBlockByNumber", json!(["latest", false]))?;
        Self::block_from_value(v)
    }

    fn block_by_number(&self, number: u64) -> Result<BlockRef, RpcError> {
        let tag = format!("0x{number:x}");
        let v = self.request("eth_getBlockByNumber", json!([tag, false]))?;
        Self::block_from_value(v)
    }

    fn gas_price(&self) -> Result<U256, RpcError> {
        let v = self.request("eth_gasPrice", json!([]))?;
        u256_from_hex(&Self::str_result(v, "eth_gasPrice")?)
    }

    fn transaction_count(&self, address: H160) -> Result<U256, RpcError> {
        let v = self.request(
            "eth_getTransactionCount",
            json!([address_to_hex(address), "pending"]),
        )?;
        u256_from_hex(&Self::str_result(v, "eth_getTransactionCount")?)
    }

    fn call(&self, to: H160, data: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let v = self.request(
            "eth_call",
            json!([
                { "to": address_to_hex(to), "data": format!("0x{}", hex::encode(&data)) },
                "latest"
            ]),
        )?;
        let s = Self::str_result(v, "eth_call")?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(|_| RpcError::Response(format!("eth_call: bad data {s:?}")))
    }

    fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256, RpcError> {
        let v = self.request(
            "eth_sendRawTransaction",
            json!([format!("0x{}", hex::encode(raw))]),
        )?;
        h256_from_hex(&Self::str_result(v, "eth_sendRawTransaction")?)
    }

    fn chain_id(&self) -> Result<u64, RpcError> {
        let v = self.request("eth_chainId", json!([]))?;
        u64_from_hex(&Self::str_result(v, "eth_chainId")?)
    }
}
