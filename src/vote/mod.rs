//! Vote Ledger - the validator's in-memory commit set
//!
//! Holds one `VoteCommit` per tracked denom and derives everything the
//! commit-reveal protocol needs from it:
//! - prevote (commit) messages carrying `vote_hash(salt, rate, denom, validator)`
//! - vote (reveal) messages disclosing rate and salt
//! - the reconciliation predicate against prevotes observed on-chain
//!
//! The set is replaced wholesale on every commit. A commit that cannot cover
//! every tracked denom leaves the previous set untouched.

use rand::rngs::OsRng;
use rand::Rng;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::chain::{MsgExchangeRatePrevote, MsgExchangeRateVote, OracleMsg};
use crate::error::{FeederError, Result};
use crate::oracle::PriceMap;
use crate::types::{format_rate, normalize_rate, Denom, OnChainPrevote, ValidatorAddress};

/// Symbols a salt is drawn from
pub const SALT_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Longest salt the oracle module accepts
pub const MAX_SALT_LENGTH: usize = 4;

/// Bytes of the SHA-256 digest kept in a vote hash
const VOTE_HASH_LEN: usize = 20;

/// Draw a salt of `len` symbols from the OS random source
pub fn generate_salt(len: usize) -> String {
    (0..len)
        .map(|_| SALT_ALPHABET[OsRng.gen_range(0..SALT_ALPHABET.len())] as char)
        .collect()
}

fn validate_salt(salt: &str) -> Result<()> {
    if salt.is_empty() || salt.len() > MAX_SALT_LENGTH {
        return Err(FeederError::InvalidSalt(format!(
            "length must be 1..={}, got {}",
            MAX_SALT_LENGTH,
            salt.len()
        )));
    }
    if !salt.bytes().all(|b| SALT_ALPHABET.contains(&b)) {
        return Err(FeederError::InvalidSalt(format!(
            "'{}' contains non-alphanumeric symbols",
            salt
        )));
    }
    Ok(())
}

/// Commitment hash checked by the oracle module when a vote is revealed:
/// hex of the first 20 bytes of `SHA-256("{salt}:{rate}:{denom}:{validator}")`.
pub fn vote_hash(salt: &str, rate: Decimal, denom: Denom, validator: &ValidatorAddress) -> String {
    let preimage = format!("{}:{}:{}:{}", salt, format_rate(rate), denom, validator);
    let digest = Sha256::digest(preimage.as_bytes());
    hex::encode(&digest[..VOTE_HASH_LEN])
}

/// One committed exchange rate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCommit {
    pub denom: Denom,
    pub rate: Decimal,
    pub salt: String,
    pub hash: String,
}

/// Commit set built but not yet swapped into the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommit {
    votes: HashMap<Denom, VoteCommit>,
}

impl PendingCommit {
    pub fn get(&self, denom: Denom) -> Option<&VoteCommit> {
        self.votes.get(&denom)
    }
}

/// Commit set of one validator
#[derive(Debug, Clone)]
pub struct VoteLedger {
    validator: ValidatorAddress,
    feeder: String,
    denoms: Vec<Denom>,
    salt_length: usize,
    votes: HashMap<Denom, VoteCommit>,
}

impl VoteLedger {
    pub fn new(validator: ValidatorAddress, denoms: Vec<Denom>, salt_length: usize) -> Self {
        let feeder = validator.account_address();
        Self {
            validator,
            feeder,
            denoms,
            salt_length: salt_length.clamp(1, MAX_SALT_LENGTH),
            votes: HashMap::new(),
        }
    }

    pub fn validator(&self) -> &ValidatorAddress {
        &self.validator
    }

    /// Account address submitting the messages
    pub fn feeder(&self) -> &str {
        &self.feeder
    }

    pub fn denoms(&self) -> &[Denom] {
        &self.denoms
    }

    pub fn get(&self, denom: Denom) -> Option<&VoteCommit> {
        self.votes.get(&denom)
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Commit `prices` under a fresh salt, replacing the whole set
    pub fn commit(&mut self, prices: &PriceMap) -> Result<()> {
        let pending = self.prepare(prices)?;
        self.apply(pending);
        Ok(())
    }

    /// Commit `prices` under `salt`, replacing the whole set.
    ///
    /// Fails without touching the current set when a tracked denom has no
    /// price or the salt is malformed.
    pub fn commit_with_salt(&mut self, prices: &PriceMap, salt: &str) -> Result<()> {
        let pending = self.prepare_with_salt(prices, salt)?;
        self.apply(pending);
        Ok(())
    }

    /// Stage a commit of `prices` under a fresh salt without replacing the
    /// current set
    pub fn prepare(&self, prices: &PriceMap) -> Result<PendingCommit> {
        let salt = generate_salt(self.salt_length);
        self.prepare_with_salt(prices, &salt)
    }

    pub fn prepare_with_salt(&self, prices: &PriceMap, salt: &str) -> Result<PendingCommit> {
        validate_salt(salt)?;

        let mut votes = HashMap::with_capacity(self.denoms.len());
        for &denom in &self.denoms {
            let rate = prices
                .get(&denom)
                .copied()
                .map(normalize_rate)
                .ok_or(FeederError::MissingPrice(denom))?;

            votes.insert(
                denom,
                VoteCommit {
                    denom,
                    rate,
                    salt: salt.to_string(),
                    hash: vote_hash(salt, rate, denom, &self.validator),
                },
            );
        }

        Ok(PendingCommit { votes })
    }

    /// Replace the current set with a staged one
    pub fn apply(&mut self, pending: PendingCommit) {
        self.votes = pending.votes;
    }

    fn lookup(&self, denom: Denom) -> Result<&VoteCommit> {
        self.votes.get(&denom).ok_or(FeederError::MissingVote(denom))
    }

    fn prevote_messages(&self, votes: &HashMap<Denom, VoteCommit>) -> Result<Vec<OracleMsg>> {
        self.denoms
            .iter()
            .map(|&denom| {
                let vote = votes.get(&denom).ok_or(FeederError::MissingVote(denom))?;
                Ok(OracleMsg::Prevote(MsgExchangeRatePrevote {
                    denom: denom.as_str().to_string(),
                    feeder: self.feeder.clone(),
                    hash: vote_hash(&vote.salt, vote.rate, denom, &self.validator),
                    validator: self.validator.to_string(),
                }))
            })
            .collect()
    }

    /// Prevote messages for the current set, hashes recomputed from the
    /// stored fields
    pub fn commit_messages(&self) -> Result<Vec<OracleMsg>> {
        self.prevote_messages(&self.votes)
    }

    /// Prevote messages for a staged set
    pub fn staged_messages(&self, pending: &PendingCommit) -> Result<Vec<OracleMsg>> {
        self.prevote_messages(&pending.votes)
    }

    /// Vote messages revealing rate and salt of the current set
    pub fn reveal_messages(&self) -> Result<Vec<OracleMsg>> {
        self.denoms
            .iter()
            .map(|&denom| {
                let vote = self.lookup(denom)?;
                Ok(OracleMsg::Vote(MsgExchangeRateVote {
                    denom: denom.as_str().to_string(),
                    exchange_rate: format_rate(vote.rate),
                    feeder: self.feeder.clone(),
                    salt: vote.salt.clone(),
                    validator: self.validator.to_string(),
                }))
            })
            .collect()
    }

    /// Whether every on-chain prevote is backed by a local commit whose
    /// recomputed hash matches
    pub fn reconciles(&self, remote: &[OnChainPrevote]) -> bool {
        remote.iter().all(|pv| {
            let Some(denom) = Denom::from_str(&pv.denom) else {
                return false;
            };
            let Some(vote) = self.votes.get(&denom) else {
                return false;
            };
            if vote.denom.as_str() != pv.denom {
                return false;
            }
            vote_hash(&vote.salt, vote.rate, vote.denom, &self.validator) == pv.hash
        })
    }

    /// Whether every tracked denom has a prevote on-chain
    pub fn has_prevotes_for_all(&self, remote: &[OnChainPrevote]) -> bool {
        let seen: HashSet<&str> = remote.iter().map(|pv| pv.denom.as_str()).collect();
        self.denoms.iter().all(|d| seen.contains(d.as_str()))
    }
}
