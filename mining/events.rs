//! Typed notification events
//!
//! The orchestrator reports to its embedder through a closed set of
//! event variants rather than free-form callback arguments.

use std::sync::Arc;

use primitive_types::{H160, H256};

/// Events emitted by the orchestrator.
#[derive(Clone, Debug)]
pub enum MinerEvent {
    /// Updated hashrate estimate, in hashes per second.
    Hashrate(f64),

    /// A proof was broadcast successfully.
    Proof {
        tx_hash: H256,
        tip: H160,
        pow_height: u64,
        gas_price_gwei: u64,
    },

    /// Recoverable condition; the mining cycle continues.
    Warning {
        message: String,
        cause: Option<String>,
    },

    /// Error condition; the mining cycle continues unless fatal.
    Error {
        message: String,
        cause: Option<String>,
    },
}

/// Observer invoked for every event. Shared between the response
/// handler and the periodic sync loop.
pub type EventObserver = Arc<dyn Fn(MinerEvent) + Send + Sync>;

/// Observer that routes events to the log.
pub fn log_observer() -> EventObserver {
    Arc::new(|event| match event {
        MinerEvent::Hashrate(rate) => log::info!("hashrate: {}", crate::format_hashrate(rate)),
        MinerEvent::Proof {
            tx_hash,
            tip,
            pow_height,
            gas_price_gwei,
        } => log::info!(
            "proof broadcast: tx {:?} (tip {:?}, height {}, {} gwei)",
            tx_hash,
            tip,
            pow_height,
            gas_price_gwei
        ),
        MinerEvent::Warning { message, cause } => match cause {
            Some(cause) => log::warn!("{}: {}", message, cause),
            None => log::warn!("{}", message),
        },
        MinerEvent::Error { message, cause } => match cause {
            Some(cause) => log::error!("{}: {}", message, cause),
            None => log::error!("{}", message),
        },
    })
}
