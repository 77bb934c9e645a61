//! Terra Chain Client
//!
//! Boundary between the feeder and the blockchain:
//! - Oracle parameter and prevote queries over Tendermint RPC
//! - Node status (latest block height)
//! - Amino-JSON signing with the feeder's secp256k1 key
//! - Transaction broadcast through the LCD REST server

pub mod rest;
pub mod signing;
pub mod types;

pub use rest::{TerraClient, TxSettings};
pub use signing::FeederKey;
pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{OnChainPrevote, ValidatorAddress};

/// Everything the scheduler needs from the chain.
///
/// The signing account and chain id are fixed when the client is built.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current oracle module parameters
    async fn fetch_oracle_params(&self) -> Result<OracleParams>;

    /// Prevotes currently stored on-chain for `validator`
    async fn fetch_validator_prevotes(
        &self,
        validator: &ValidatorAddress,
    ) -> Result<Vec<OnChainPrevote>>;

    /// Latest block the node has seen
    async fn current_status(&self) -> Result<ChainStatus>;

    /// Sign `msgs` into one transaction and broadcast it
    async fn sign_and_broadcast(&self, msgs: &[OracleMsg]) -> Result<BroadcastResult>;
}
