//! EIP-155 legacy transaction signer

use primitive_types::U256;
use rpc_core::abi::keccak256;
use rpc_core::model::UnsignedTransaction;
use rpc_core::{SignerError, TransactionSigner};
use secp256k1::{All, Message, Secp256k1};

use crate::keys::Keys;
use crate::rlp;

/// Signs transactions with a local in-memory key.
pub struct LocalSigner {
    keys: Keys,
    secp: Secp256k1<All>,
}

impl LocalSigner {
    pub fn new(keys: Keys) -> Self {
        Self {
            keys,
            secp: Secp256k1::new(),
        }
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    fn encode_body(tx: &UnsignedTransaction, out: &mut Vec<u8>) {
        rlp::encode_uint(out, tx.nonce);
        rlp::encode_uint(out, tx.gas_price);
        rlp::encode_uint(out, tx.gas_limit);
        rlp::encode_bytes(out, tx.to.as_bytes());
        rlp::encode_uint(out, tx.value);
        rlp::encode_bytes(out, &tx.data);
    }

    fn sighash(tx: &UnsignedTransaction) -> [u8; 32] {
        let mut payload = Vec::new();
        Self::encode_body(tx, &mut payload);
        // EIP-155 pre-image: (..., chain_id, 0, 0)
        rlp::encode_uint(&mut payload, U256::from(tx.chain_id));
        rlp::encode_uint(&mut payload, U256::zero());
        rlp::encode_uint(&mut payload, U256::zero());
        keccak256(&rlp::wrap_list(&payload))
    }
}

impl TransactionSigner for LocalSigner {
    fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError> {
        let digest = Self::sighash(tx);
        let message = Message::from_slice(&digest)
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        let signature = self
            .secp
            .sign_ecdsa_recoverable(&message, self.keys.secret());
        let (recovery_id, compact) = signature.serialize_compact();

        let v = tx.chain_id * 2 + 35 + recovery_id.to_i32() as u64;
        let mut payload = Vec::new();
        Self::encode_body(tx, &mut payload);
        rlp::encode_uint(&mut payload, U256::from(v));
        rlp::encode_uint(&mut payload, U256::from_big_endian(&compact[..32]));
        rlp::encode_uint(&mut payload, U256::from_big_endian(&compact[32..]));
        Ok(rlp::wrap_list(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::H160;
    use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};

    fn sample_tx() -> UnsignedTransaction {
        UnsignedTransaction {
            nonce: U256::from(9),
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: U256::from(21_000),
            to: H160::repeat_byte(0x35),
            value: U256::zero(),
            data: vec![0xde, 0xad],
            chain_id: 1,
        }
    }

    fn signer() -> LocalSigner {
        LocalSigner::new(
            Keys::from_hex("4646464646464646464646464646464646464646464646464646464646464646")
                .unwrap(),
        )
    }

    #[test]
    fn raw_tx_is_a_well_formed_list() {
        let raw = signer().sign(&sample_tx()).unwrap();
        // short legacy tx: single-byte list header
        assert!(raw[0] >= 0xc0);
        let declared = if raw[0] <= 0xf7 {
            (raw[0] - 0xc0) as usize + 1
        } else {
            let len_of_len = (raw[0] - 0xf7) as usize;
            let mut len = 0usize;
            for b in &raw[1..1 + len_of_len] {
                len = (len << 8) | *b as usize;
            }
            len + 1 + len_of_len
        };
        assert_eq!(declared, raw.len());
    }

    #[test]
    fn signature_recovers_to_signer_address() {
        let signer = signer();
        let tx = sample_tx();
        let digest = LocalSigner::sighash(&tx);
        let message = Message::from_slice(&digest).unwrap();
        let sig = signer
            .secp
            .sign_ecdsa_recoverable(&message, signer.keys.secret());
        let (rec, compact) = sig.serialize_compact();
        let rebuilt =
            RecoverableSignature::from_compact(&compact, RecoveryId::from_i32(rec.to_i32()).unwrap())
                .unwrap();
        let recovered = signer.secp.recover_ecdsa(&message, &rebuilt).unwrap();
        let digest = keccak256(&recovered.serialize_uncompressed()[1..]);
        assert_eq!(H160::from_slice(&digest[12..]), signer.keys.address());
    }

    #[test]
    fn v_encodes_chain_id() {
        let mut tx = sample_tx();
        tx.chain_id = 3;
        let raw = signer().sign(&tx).unwrap();
        // v = 3*2 + 35 + {0,1} = 41 or 42, a single low byte in RLP
        assert!(raw.windows(1).any(|w| w[0] == 41 || w[0] == 42));
    }
}
