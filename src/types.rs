//! Core types used throughout the feeder
//!
//! Denoms, fiat units, validator addresses, on-chain prevote snapshots and
//! the round arithmetic.

use bech32::{FromBase32, ToBase32, Variant};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FeederError, Result};

/// Fractional digits of the chain's fixed-point decimal
pub const RATE_PRECISION: u32 = 18;

/// Bech32 prefix of validator operator addresses
pub const VALOPER_PREFIX: &str = "terravaloper";

/// Bech32 prefix of account addresses
pub const ACCOUNT_PREFIX: &str = "terra";

/// Oracle denoms the feeder can vote on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Denom {
    #[serde(rename = "ukrw")]
    Krw,
    #[serde(rename = "uusd")]
    Usd,
    #[serde(rename = "umnt")]
    Mnt,
    #[serde(rename = "usdr")]
    Sdr,
}

impl Denom {
    pub const ALL: [Denom; 4] = [Denom::Krw, Denom::Usd, Denom::Mnt, Denom::Sdr];

    /// On-chain denom string
    pub fn as_str(&self) -> &'static str {
        match self {
            Denom::Krw => "ukrw",
            Denom::Usd => "uusd",
            Denom::Mnt => "umnt",
            Denom::Sdr => "usdr",
        }
    }

    /// Fiat unit the denom is priced in
    pub fn fiat(&self) -> Fiat {
        match self {
            Denom::Krw => Fiat::Krw,
            Denom::Usd => Fiat::Usd,
            Denom::Mnt => Fiat::Mnt,
            Denom::Sdr => Fiat::Xdr,
        }
    }

    /// Parse from the on-chain denom string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ukrw" => Some(Denom::Krw),
            "uusd" => Some(Denom::Usd),
            "umnt" => Some(Denom::Mnt),
            "usdr" => Some(Denom::Sdr),
            _ => None,
        }
    }
}

impl fmt::Display for Denom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fiat units quoted by upstream feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fiat {
    Usd,
    Krw,
    Mnt,
    Xdr,
}

impl Fiat {
    /// Symbol used by the fx feed
    pub fn symbol(&self) -> &'static str {
        match self {
            Fiat::Usd => "USD",
            Fiat::Krw => "KRW",
            Fiat::Mnt => "MNT",
            Fiat::Xdr => "XDR",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Some(Fiat::Usd),
            "KRW" => Some(Fiat::Krw),
            "MNT" => Some(Fiat::Mnt),
            "XDR" | "SDR" => Some(Fiat::Xdr),
            _ => None,
        }
    }
}

impl fmt::Display for Fiat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Validator operator address (`terravaloper1...`)
///
/// The feeder account signing oracle messages is the same key re-encoded with
/// the account prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatorAddress {
    bytes: Vec<u8>,
    bech32: String,
}

impl ValidatorAddress {
    pub fn parse(s: &str) -> Result<Self> {
        let (hrp, data, variant) = bech32::decode(s.trim())
            .map_err(|e| FeederError::InvalidAddress(format!("{}: {}", s, e)))?;

        if hrp != VALOPER_PREFIX {
            return Err(FeederError::InvalidAddress(format!(
                "{}: expected prefix '{}', got '{}'",
                s, VALOPER_PREFIX, hrp
            )));
        }
        if variant != Variant::Bech32 {
            return Err(FeederError::InvalidAddress(format!(
                "{}: bech32m is not a valid address encoding",
                s
            )));
        }

        let bytes = Vec::<u8>::from_base32(&data)
            .map_err(|e| FeederError::InvalidAddress(format!("{}: {}", s, e)))?;
        if bytes.len() != 20 {
            return Err(FeederError::InvalidAddress(format!(
                "{}: expected 20 address bytes, got {}",
                s,
                bytes.len()
            )));
        }

        Ok(Self {
            bytes,
            bech32: s.trim().to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.bech32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Account address sharing the validator's key
    pub fn account_address(&self) -> String {
        // Encoding 20 bytes under a fixed, valid prefix cannot fail.
        bech32::encode(ACCOUNT_PREFIX, self.bytes.to_base32(), Variant::Bech32)
            .unwrap_or_default()
    }
}

impl fmt::Display for ValidatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bech32)
    }
}

/// Prevote as recorded on-chain for this validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainPrevote {
    pub denom: String,
    pub hash: String,
    pub voter: String,
    pub submit_block: u64,
}

impl OnChainPrevote {
    pub fn new(denom: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            denom: denom.into(),
            hash: hash.into(),
            voter: String::new(),
            submit_block: 0,
        }
    }
}

/// Voting round containing `height`; `None` while the period is unknown
pub fn round_of(height: u64, vote_period: u64) -> Option<u64> {
    if vote_period == 0 {
        return None;
    }
    Some(height / vote_period)
}

/// Round a rate to the chain's decimal precision
pub fn normalize_rate(rate: Decimal) -> Decimal {
    rate.round_dp(RATE_PRECISION).normalize()
}

/// Render a rate the way the chain renders its fixed-point decimals
/// (always exactly 18 fractional digits)
pub fn format_rate(rate: Decimal) -> String {
    let mut r = rate.round_dp(RATE_PRECISION);
    r.rescale(RATE_PRECISION);
    r.to_string()
}
