//! Chain Types - Oracle messages and amino-JSON transaction structures

use serde::{Deserialize, Deserializer, Serialize};

/// Oracle module message, serialised in amino-JSON `{type, value}` form.
///
/// Struct fields below are declared in alphabetical order: serde emits them
/// in declaration order and the sign bytes need sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum OracleMsg {
    #[serde(rename = "oracle/MsgExchangeRatePrevote")]
    Prevote(MsgExchangeRatePrevote),
    #[serde(rename = "oracle/MsgExchangeRateVote")]
    Vote(MsgExchangeRateVote),
}

impl OracleMsg {
    pub fn denom(&self) -> &str {
        match self {
            OracleMsg::Prevote(m) => &m.denom,
            OracleMsg::Vote(m) => &m.denom,
        }
    }

    pub fn is_vote(&self) -> bool {
        matches!(self, OracleMsg::Vote(_))
    }
}

/// Commitment to an exchange rate for the next round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgExchangeRatePrevote {
    pub denom: String,
    pub feeder: String,
    pub hash: String,
    pub validator: String,
}

/// Reveal of the rate and salt behind an earlier prevote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgExchangeRateVote {
    pub denom: String,
    pub exchange_rate: String,
    pub feeder: String,
    pub salt: String,
    pub validator: String,
}

/// Oracle module parameters (only the fields the feeder reads)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OracleParams {
    #[serde(deserialize_with = "u64_from_str_or_num")]
    pub vote_period: u64,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Node sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStatus {
    pub latest_block_height: u64,
}

/// Outcome of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResult {
    pub tx_hash: String,
    pub code: u32,
    pub raw_log: String,
}

/// Amino coin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub amount: String,
    pub denom: String,
}

/// Amino transaction fee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdFee {
    pub amount: Vec<Coin>,
    pub gas: String,
}

/// Amino public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

/// Amino signature entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: PubKey,
    pub signature: String,
}

/// Signed amino transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdTx {
    pub msg: Vec<OracleMsg>,
    pub fee: StdFee,
    pub signatures: Vec<StdSignature>,
    pub memo: String,
}

/// Document signed by the feeder key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StdSignDoc {
    pub account_number: String,
    pub chain_id: String,
    pub fee: StdFee,
    pub memo: String,
    pub msgs: Vec<OracleMsg>,
    pub sequence: String,
}

/// Account number and sequence of the feeder account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

/// Cosmos JSON encodes 64-bit integers as strings; accept both
pub(crate) fn u64_from_str_or_num<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}
