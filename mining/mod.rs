//! Mining orchestration for a proof-of-work incentive contract
//!
//! This crate keeps an external compute engine continuously supplied
//! with correctly-parameterized work, adapts difficulty to observed
//! throughput, tracks per-target submission heights, applies a bounded
//! gas-price policy and submits proofs through a signing collaborator.
//!
//! ## Module Organization
//!
//! - [`looper`]: cooperative periodic-task scheduler with graceful stop
//! - [`retry`]: unbounded jittered exponential-backoff retry
//! - [`hashrate`]: exponential moving average of observed throughput
//! - [`difficulty`]: throughput -> difficulty / work-budget controller
//! - [`tips`]: deterministic tip-recipient selection and rotation
//! - [`heights`]: per-target pow-height cache
//! - [`gas`]: bounded gas-price policy
//! - [`queue`]: engine line protocol and request correlation FIFO
//! - [`engine`]: compute-engine subprocess handle
//! - [`orchestrator`]: top-level mining state machine
//! - [`events`]: typed notification events for the embedder

pub mod config;
pub mod difficulty;
pub mod engine;
pub mod events;
pub mod gas;
pub mod hashrate;
pub mod heights;
pub mod looper;
pub mod orchestrator;
pub mod queue;
pub mod retry;
pub mod tips;

#[cfg(test)]
pub mod tests;

// Re-export main types for easier access
pub use config::MinerConfig;
pub use difficulty::{DifficultyController, WorkBudget};
pub use events::{EventObserver, MinerEvent};
pub use gas::{GasConfig, GasPricePolicy, GasPriceError, GasQuote};
pub use hashrate::{format_hashrate, HashrateEstimator};
pub use heights::{PowHeightCache, TargetKey};
pub use looper::{Looper, LooperError};
pub use orchestrator::{MinerError, MinerState, MiningOrchestrator};
pub use queue::{EngineResponse, MiningRequest, MiningRequestQueue};
pub use retry::RetryPolicy;
pub use tips::TipSelector;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::MinerConfig;
    pub use crate::events::{EventObserver, MinerEvent};
    pub use crate::gas::{GasConfig, GasPricePolicy};
    pub use crate::hashrate::format_hashrate;
    pub use crate::orchestrator::{MinerError, MiningOrchestrator};
}
