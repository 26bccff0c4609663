//! Policy parameters shared by the script registry, limiter façade, and
//! configuration loader.

use crate::error::{FluxError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four supported rate-limiting algorithms. Each variant names
/// the policy script in [`crate::scripts::ScriptRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Gcra,
    TokenBucket,
    LeakyBucket,
    FixedWindow,
}

impl Policy {
    pub const ALL: [Policy; 4] =
        [Policy::Gcra, Policy::TokenBucket, Policy::LeakyBucket, Policy::FixedWindow];

    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Gcra => "gcra",
            Policy::TokenBucket => "token_bucket",
            Policy::LeakyBucket => "leaky_bucket",
            Policy::FixedWindow => "fixed_window",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters for a single named rate limit: quota `requests` within
/// `period` seconds, with an optional `burst` allowance (defaults to
/// `requests` when unset).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicyParams {
    pub policy: Policy,
    pub requests: u32,
    pub period: u32,
    #[serde(default)]
    pub burst: Option<u32>,
}

impl PolicyParams {
    pub fn new(policy: Policy, requests: u32, period: u32) -> Self {
        Self { policy, requests, period, burst: None }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    /// `burst`, defaulting to `requests` when unset.
    pub fn effective_burst(&self) -> u32 {
        self.burst.unwrap_or(self.requests)
    }

    pub fn validate(&self) -> Result<()> {
        if self.requests == 0 {
            return Err(FluxError::Config("requests must be positive".into()));
        }
        if self.period == 0 {
            return Err(FluxError::Config("period must be positive".into()));
        }
        if let Some(burst) = self.burst {
            if burst == 0 {
                return Err(FluxError::Config("burst must be positive".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_defaults_to_requests() {
        let params = PolicyParams::new(Policy::Gcra, 5, 60);
        assert_eq!(params.effective_burst(), 5);
    }

    #[test]
    fn explicit_burst_wins() {
        let params = PolicyParams::new(Policy::TokenBucket, 5, 60).with_burst(10);
        assert_eq!(params.effective_burst(), 10);
    }

    #[test]
    fn rejects_zero_requests() {
        let params = PolicyParams::new(Policy::FixedWindow, 0, 60);
        assert!(params.validate().is_err());
    }

    #[test]
    fn policy_round_trips_through_serde() {
        let json = serde_json::to_string(&Policy::TokenBucket).unwrap();
        assert_eq!(json, "\"token_bucket\"");
        let back: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Policy::TokenBucket);
    }
}
