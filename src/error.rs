//! Error taxonomy for the feeder core
//!
//! Feed, aggregation and vote-ledger failures are typed so the scheduler can
//! log them precisely. None of them is fatal: a failing round action is
//! abandoned and retried on the next round boundary.

use std::time::Duration;

use thiserror::Error;

use crate::types::{Denom, Fiat};

/// Errors raised by price sources, the aggregator and the vote ledger
#[derive(Debug, Error)]
pub enum FeederError {
    /// Transport failure or non-success HTTP status
    #[error("network error from {source_name}: {reason}")]
    Network { source_name: String, reason: String },

    /// Upstream payload could not be decoded (JSON, base64, OBI)
    #[error("decode error from {source_name}: {reason}")]
    Decode { source_name: String, reason: String },

    /// Upstream payload has the wrong fixed-width length
    #[error("shape error from {source_name}: expected {expected} bytes, got {actual}")]
    Shape {
        source_name: String,
        expected: usize,
        actual: usize,
    },

    /// Price collection did not finish within the deadline
    #[error("price collection timed out after {elapsed:?} ({received}/{expected} sources reported)")]
    Timeout {
        elapsed: Duration,
        received: usize,
        expected: usize,
    },

    /// Ledger asked for a denom that was never committed
    #[error("no committed vote for {0}")]
    MissingVote(Denom),

    /// Price map handed to commit lacks a tracked denom
    #[error("no price for tracked denom {0}")]
    MissingPrice(Denom),

    /// Fx feed did not provide a usable rate for a fiat unit
    #[error("no usable fx rate for {0}")]
    MissingFxRate(Fiat),

    /// Every observation for a denom was missing
    #[error("no price candidates for {0}")]
    NoCandidates(Denom),

    #[error("invalid salt: {0}")]
    InvalidSalt(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl FeederError {
    pub fn network(source_name: impl Into<String>, reason: impl ToString) -> Self {
        FeederError::Network {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(source_name: impl Into<String>, reason: impl ToString) -> Self {
        FeederError::Decode {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn shape(source_name: impl Into<String>, expected: usize, actual: usize) -> Self {
        FeederError::Shape {
            source_name: source_name.into(),
            expected,
            actual,
        }
    }

    /// Invariant violations, as opposed to upstream data problems
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, FeederError::MissingVote(_))
    }
}

pub type Result<T> = std::result::Result<T, FeederError>;
