//! Compute-engine line protocol and request correlation
//!
//! Requests are serialized as a single space-separated line terminated
//! by `";\n"` and written to the engine's input stream; responses come
//! back on its output stream, one per line, tagged `F:` (budget
//! exhausted), `N:` (nonce found) or `H:` (progress report). The FIFO
//! keeps issued requests until their terminal response arrives so each
//! response is matched to the request that produced it. Current usage
//! depth is 1, but the queue stays general so a pipelined engine could
//! be driven without redesign.

use std::collections::VecDeque;
use std::io::{self, Write};

use primitive_types::{H160, H256, U128, U256};
use rpc_core::model::{address_to_hex, u256_to_hex64, BlockRef};

use crate::heights::TargetKey;

/// One unit of work issued to the compute engine. Immutable once
/// issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiningRequest {
    pub key: TargetKey,
    pub block: BlockRef,
    pub difficulty: U256,
    pub pow_height: u64,
    pub thread_iterations: u64,
    pub hash_limit: u64,
    pub nonce_offset: U128,
}

impl MiningRequest {
    /// Canonical request line, in the exact field order the engine
    /// parses: miner, tip, block hash, block number, difficulty,
    /// split bps, pow height, thread iterations, hash limit, nonce
    /// offset.
    pub fn to_line(&self) -> String {
        format!(
            "{} {} 0x{} {} {} {} {} {} {} {};\n",
            address_to_hex(self.key.miner),
            address_to_hex(self.key.tip),
            hex::encode(self.block.hash.as_bytes()),
            self.block.number,
            u256_to_hex64(self.difficulty),
            self.key.split_numerator,
            self.pow_height,
            self.thread_iterations,
            self.hash_limit,
            nonce_offset_hex(self.nonce_offset),
        )
    }
}

/// 128-bit nonce offset, zero-padded to a full 32-byte word.
fn nonce_offset_hex(offset: U128) -> String {
    let mut bytes = [0u8; 32];
    offset.to_big_endian(&mut bytes[16..]);
    format!("0x{}", hex::encode(bytes))
}

/// A parsed engine response line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineResponse {
    /// Hash budget exhausted without a proof.
    Exhausted,
    /// Proof found at this nonce.
    Nonce(U256),
    /// Periodic progress report: cumulative hashes for the current
    /// request.
    Progress { hashes: u64 },
}

/// Parse one engine output line.
pub fn parse_response(line: &str) -> Result<EngineResponse, String> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("N:") {
        let digits = rest.split(';').next().unwrap_or("").trim();
        if digits.is_empty() || digits.len() > 64 {
            return Err(format!("bad nonce field in {line:?}"));
        }
        let padded = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(&padded).map_err(|_| format!("bad nonce hex in {line:?}"))?;
        Ok(EngineResponse::Nonce(U256::from_big_endian(&bytes)))
    } else if let Some(rest) = line.strip_prefix("H:") {
        let body = rest.split(';').next().unwrap_or("");
        let mut fields = body.split_whitespace();
        let _index = fields
            .next()
            .ok_or_else(|| format!("missing progress index in {line:?}"))?;
        let hashes = fields
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| format!("bad progress count in {line:?}"))?;
        Ok(EngineResponse::Progress { hashes })
    } else if line.starts_with("F:") {
        Ok(EngineResponse::Exhausted)
    } else {
        Err(format!("unrecognized engine output: {line:?}"))
    }
}

/// FIFO correlation layer between outbound requests and the engine's
/// response stream.
pub struct MiningRequestQueue {
    sink: Box<dyn Write + Send>,
    pending: VecDeque<MiningRequest>,
}

impl MiningRequestQueue {
    /// `sink` is the engine's input stream (or a buffer in tests).
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            pending: VecDeque::new(),
        }
    }

    /// Serialize and write `request`, then record it as outstanding.
    pub fn send(&mut self, request: MiningRequest) -> io::Result<()> {
        self.sink.write_all(request.to_line().as_bytes())?;
        self.sink.flush()?;
        self.pending.push_back(request);
        Ok(())
    }

    /// Oldest outstanding request, for progress reports.
    pub fn peek_head(&self) -> Option<&MiningRequest> {
        self.pending.front()
    }

    /// Remove and return the oldest outstanding request, for terminal
    /// responses. Empty queue is a well-defined `None`, never a fault.
    pub fn pop_head(&mut self) -> Option<MiningRequest> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
