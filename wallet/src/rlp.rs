//! Minimal RLP encoding for legacy transactions

use primitive_types::U256;

/// Append an RLP-encoded byte string.
pub fn encode_bytes(out: &mut Vec<u8>, data: &[u8]) {
    if data.len() == 1 && data[0] < 0x80 {
        out.push(data[0]);
    } else {
        encode_length(out, data.len(), 0x80);
        out.extend_from_slice(data);
    }
}

/// Append an RLP-encoded unsigned integer (minimal big-endian form,
/// zero encodes as the empty string).
pub fn encode_uint(out: &mut Vec<u8>, v: U256) {
    let mut word = [0u8; 32];
    v.to_big_endian(&mut word);
    let first = word.iter().position(|b| *b != 0).unwrap_or(32);
    encode_bytes(out, &word[first..]);
}

/// Wrap an already-encoded payload as an RLP list.
pub fn wrap_list(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    encode_length(&mut out, payload.len(), 0xc0);
    out.extend_from_slice(payload);
    out
}

fn encode_length(out: &mut Vec<u8>, len: usize, offset: u8) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let be = len.to_be_bytes();
        let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
        let len_bytes = &be[first..];
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}
