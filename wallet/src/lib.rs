//! Local-key signing collaborator
//!
//! Implements [`rpc_core::TransactionSigner`] with an in-memory
//! secp256k1 key and EIP-155 legacy transaction encoding. Keystore
//! files and at-rest encryption are deliberately not part of this
//! crate; key material arrives as hex and lives only in memory.

pub mod keys;
pub mod rlp;
pub mod signer;

pub use keys::Keys;
pub use signer::LocalSigner;
