//! Configuration sections

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FeederConfig {
    /// Validator operator address (terravaloper1...)
    pub validator_address: String,
    /// Chain id the transactions are signed for
    pub chain_id: String,
    /// Denoms to vote on (ukrw, uusd, umnt, usdr)
    pub denoms: Vec<String>,
    /// Salt length, 1..=4
    pub salt_length: usize,
    /// Block height poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Retry interval while the oracle parameters are unknown
    pub bootstrap_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Tendermint RPC endpoint
    pub rpc_url: String,
    /// LCD REST endpoint
    pub lcd_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxConfig {
    pub gas: u64,
    /// Fee in `fee_denom`; zero sends no fee coin
    pub fee_amount: u64,
    pub fee_denom: String,
    pub memo: String,
    /// LCD broadcast mode (block, sync, async)
    pub broadcast_mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedsConfig {
    /// Band REST base URL
    pub band_url: String,
    /// Oracle script returning exchange quotes
    pub exchange_script_id: u64,
    pub exchange_symbol: String,
    /// Oracle script returning USD values of fiat units
    pub fx_script_id: u64,
    pub fx_symbols: Vec<String>,
    /// Fixed-point multiplier applied by the scripts
    pub multiplier: u64,
    pub min_count: u64,
    pub ask_count: u64,
    /// Deadline for one price collection in milliseconds
    pub timeout_ms: u64,
}
