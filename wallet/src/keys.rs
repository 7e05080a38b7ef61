//! Key material and address derivation

use primitive_types::H160;
use rpc_core::abi::keccak256;
use rpc_core::SignerError;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

/// A secp256k1 keypair with its derived account address.
pub struct Keys {
    secret: SecretKey,
    address: H160,
}

impl Keys {
    /// Parse a secret key from a hex string (optionally `0x`-prefixed).
    pub fn from_hex(s: &str) -> Result<Self, SignerError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| SignerError::Key(format!("key is not valid hex: {e}")))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| SignerError::Key(format!("invalid secret key: {e}")))?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self {
            secret,
            address: derive_address(&public),
        })
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Account address: last 20 bytes of keccak-256 of the
    /// uncompressed public key (tag byte stripped).
    pub fn address(&self) -> H160 {
        self.address
    }
}

fn derive_address(public: &PublicKey) -> H160 {
    let uncompressed = public.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    H160::from_slice(&digest[12..])
}
