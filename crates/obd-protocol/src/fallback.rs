//! Fallback substitution for unusable readings
//!
//! A flaky adapter link must not blank the dashboard: when a channel cannot be
//! read, a plausible value inside the channel's nominal range is reported
//! instead, tagged so callers can tell it apart from a live read.

use crate::error::ObdError;
use crate::pid::Pid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a reading was substituted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Adapter answered `NO DATA`
    NoData,
    /// Adapter answered `ERROR`, `?` or a bus error string
    AdapterError(String),
    /// Response did not contain the expected hex payload
    Malformed(String),
    /// Decoded value was NaN, negative or physically implausible
    OutOfRange(f64),
    /// No prompt within the command window
    Timeout,
    /// The command never reached the adapter
    Transport(String),
}

impl FallbackReason {
    /// Classify a transport-level failure
    pub fn from_error(err: &ObdError) -> Self {
        match err {
            ObdError::CommandTimeout { .. } => FallbackReason::Timeout,
            ObdError::InvalidResponse(msg) => FallbackReason::Malformed(msg.clone()),
            other => FallbackReason::Transport(other.to_string()),
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackReason::NoData => write!(f, "no data"),
            FallbackReason::AdapterError(text) => write!(f, "adapter error: {}", text),
            FallbackReason::Malformed(text) => write!(f, "malformed response: {}", text),
            FallbackReason::OutOfRange(value) => write!(f, "value out of range: {}", value),
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::Transport(text) => write!(f, "transport: {}", text),
        }
    }
}

/// How substitute values are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Bounded random value inside the nominal range
    #[default]
    Simulate,
    /// Repeat the last live value, simulate when there is none
    Hold,
}

/// Produces substitute values for failed channels
pub struct FallbackGenerator {
    policy: FallbackPolicy,
    rng: StdRng,
    last_live: HashMap<Pid, f64>,
}

impl FallbackGenerator {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_rng(&mut rand::rng()),
            last_live: HashMap::new(),
        }
    }

    /// Deterministic generator for tests and demos
    pub fn seeded(policy: FallbackPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: StdRng::seed_from_u64(seed),
            last_live: HashMap::new(),
        }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    /// Remember a live value for the `Hold` policy
    pub fn observe(&mut self, pid: Pid, value: f64) {
        self.last_live.insert(pid, value);
    }

    /// Produce a substitute value for `pid`
    pub fn substitute(&mut self, pid: Pid) -> f64 {
        if self.policy == FallbackPolicy::Hold {
            if let Some(value) = self.last_live.get(&pid) {
                return *value;
            }
        }
        self.simulate(pid)
    }

    fn simulate(&mut self, pid: Pid) -> f64 {
        let range = pid.nominal_range();
        let value = self.rng.random_range(range.min..=range.max);
        // one decimal, like the gauges display
        let value = (value * 10.0).round() / 10.0;
        value.clamp(range.min, range.max)
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new(FallbackPolicy::default())
    }
}
