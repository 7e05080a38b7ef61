//! Signing collaborator contract
//!
//! The orchestrator hands an [`UnsignedTransaction`] to a signer and
//! gets back raw broadcastable bytes. The implementation behind the
//! trait is opaque: a local key, a hardware wallet, a remote service.

use thiserror::Error;

use crate::model::UnsignedTransaction;

/// Signer error type
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("invalid key material: {0}")]
    Key(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Produces raw signed transaction bytes for broadcast.
pub trait TransactionSigner: Send + Sync {
    fn sign(&self, tx: &UnsignedTransaction) -> Result<Vec<u8>, SignerError>;
}
