//! Contract ABI helpers for the incentive contract
//!
//! Every argument of the contract surface is statically sized
//! (addresses, fixed arrays, uint256), so call data is a 4-byte
//! keccak selector followed by inline 32-byte words.

use primitive_types::{H160, H256, U256};
use sha3::{Digest, Keccak256};

use crate::model::RpcError;

/// keccak-256 digest of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// 4-byte function selector for a canonical signature string.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn push_u256(out: &mut Vec<u8>, v: U256) {
    let mut word = [0u8; 32];
    v.to_big_endian(&mut word);
    out.extend_from_slice(&word);
}

fn push_address(out: &mut Vec<u8>, a: H160) {
    out.extend_from_slice(&[0u8; 12]);
    out.extend_from_slice(a.as_bytes());
}

/// Call data for
/// `mine(address[2],uint256[2],uint256,uint256,uint256,uint256,uint256)`:
/// recipients, splits, block number, block hash, difficulty, pow height,
/// nonce.
#[allow(clippy::too_many_arguments)]
pub fn mine_call(
    recipients: [H160; 2],
    splits: [U256; 2],
    block_number: u64,
    block_hash: H256,
    difficulty: U256,
    pow_height: u64,
    nonce: U256,
) -> Vec<u8> {
    let mut out =
        selector("mine(address[2],uint256[2],uint256,uint256,uint256,uint256,uint256)").to_vec();
    push_address(&mut out, recipients[0]);
    push_address(&mut out, recipients[1]);
    push_u256(&mut out, splits[0]);
    push_u256(&mut out, splits[1]);
    push_u256(&mut out, U256::from(block_number));
    push_u256(&mut out, U256::from_big_endian(block_hash.as_bytes()));
    push_u256(&mut out, difficulty);
    push_u256(&mut out, U256::from(pow_height));
    push_u256(&mut out, nonce);
    out
}

/// Call data for `get_pow_height(address,address[2],uint256[2])`.
pub fn pow_height_call(submitter: H160, recipients: [H160; 2], splits: [U256; 2]) -> Vec<u8> {
    let mut out = selector("get_pow_height(address,address[2],uint256[2])").to_vec();
    push_address(&mut out, submitter);
    push_address(&mut out, recipients[0]);
    push_address(&mut out, recipients[1]);
    push_u256(&mut out, splits[0]);
    push_u256(&mut out, splits[1]);
    out
}

/// Call data for `start_time()`.
pub fn start_time_call() -> Vec<u8> {
    selector("start_time()").to_vec()
}

/// Decode a single uint256 return word.
pub fn decode_uint(ret: &[u8]) -> Result<U256, RpcError> {
    if ret.len() < 32 {
        return Err(RpcError::Response(format!(
            "return data too short: {} bytes",
            ret.len()
        )));
    }
    Ok(U256::from_big_endian(&ret[..32]))
}
