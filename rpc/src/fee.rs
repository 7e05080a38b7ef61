//! Best-effort speed-tier fee oracle
//!
//! Queries an external HTTP service for named gas-price tiers.
//! The oracle is advisory only: any failure is logged at debug level
//! and reported as `None`, never propagated.

use std::time::Duration;

use serde_json::Value;

use crate::model::RpcError;

/// Speed-tier gas estimate source.
pub struct FeeOracle {
    http: reqwest::blocking::Client,
    url: String,
    tier: String,
}

impl FeeOracle {
    /// `tier` names the JSON field to read, e.g. `"fast"`.
    pub fn new(url: impl Into<String>, tier: impl Into<String>) -> Result<Self, RpcError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            tier: tier.into(),
        })
    }

    /// Fetch the configured tier in gwei, or `None` on any failure.
    pub fn tier_gwei(&self) -> Option<u64> {
        match self.fetch() {
            Ok(gwei) => Some(gwei),
            Err(e) => {
                log::debug!("fee oracle unavailable ({}): {}", self.url, e);
                None
            }
        }
    }

    fn fetch(&self) -> Result<u64, RpcError> {
        let body: Value = self.http.get(&self.url).send()?.json()?;
        let value = body
            .get(&self.tier)
            .and_then(Value::as_f64)
            .ok_or_else(|| RpcError::Response(format!("no tier {:?} in estimate", self.tier)))?;
        if !value.is_finite() || value < 0.0 {
            return Err(RpcError::Response(format!("bad tier value {value}")));
        }
        Ok(value.round() as u64)
    }
}
