//! Round Scheduler
//!
//! Drives the commit-reveal protocol once per voting round:
//! 1. read the validator's prevotes from the chain
//! 2. reveal the current commit set when the chain holds exactly our prevotes
//! 3. aggregate fresh prices and commit them for the next round
//! 4. broadcast reveals and commits as one transaction
//!
//! The round marker only moves after the chain accepted the transaction, so
//! a failed action is retried on the next poll.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::LedgerClient;
use crate::error::FeederError;
use crate::oracle::PriceAggregator;
use crate::types::round_of;
use crate::vote::VoteLedger;

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Oracle parameters not known yet
    Bootstrapping,
    /// Waiting for the next round boundary
    Idle,
    /// Round action in flight
    Acting,
}

/// Outcome of one broadcast round action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
    pub round: u64,
    pub height: u64,
    /// Vote messages in the transaction
    pub revealed: usize,
    /// Prevote messages in the transaction
    pub committed: usize,
    pub tx_hash: String,
    pub code: u32,
    pub acted_at: DateTime<Utc>,
}

impl RoundReport {
    pub fn accepted(&self) -> bool {
        self.code == 0
    }
}

/// Commit-reveal state machine for one validator
pub struct Feeder {
    ledger: Arc<dyn LedgerClient>,
    aggregator: PriceAggregator,
    votes: VoteLedger,
    state: SchedulerState,
    vote_period: u64,
    last_prevote_round: Option<u64>,
    latest_block_height: u64,
    poll_interval: Duration,
    bootstrap_interval: Duration,
}

impl Feeder {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        aggregator: PriceAggregator,
        votes: VoteLedger,
        poll_interval: Duration,
        bootstrap_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            aggregator,
            votes,
            state: SchedulerState::Bootstrapping,
            vote_period: 0,
            last_prevote_round: None,
            latest_block_height: 0,
            poll_interval,
            bootstrap_interval,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn vote_period(&self) -> u64 {
        self.vote_period
    }

    /// Last round whose transaction the chain accepted
    pub fn last_prevote_round(&self) -> Option<u64> {
        self.last_prevote_round
    }

    pub fn latest_block_height(&self) -> u64 {
        self.latest_block_height
    }

    pub fn votes(&self) -> &VoteLedger {
        &self.votes
    }

    /// Fetch the oracle parameters once; true when the vote period is known
    async fn refresh_params(&mut self) -> Result<bool> {
        let params = self
            .ledger
            .fetch_oracle_params()
            .await
            .context("Failed to fetch oracle params")?;

        if params.vote_period == 0 {
            return Ok(false);
        }

        self.vote_period = params.vote_period;
        self.state = SchedulerState::Idle;
        tracing::info!(
            vote_period = params.vote_period,
            whitelist = ?params.whitelist,
            "✅ Oracle parameters loaded"
        );
        Ok(true)
    }

    /// Poll the oracle parameters until the vote period is known
    pub async fn bootstrap(&mut self) {
        while self.state == SchedulerState::Bootstrapping {
            match self.refresh_params().await {
                Ok(true) => break,
                Ok(false) => tracing::warn!("Oracle vote period is still zero, retrying"),
                Err(e) => tracing::warn!(error = %e, "Oracle params unavailable, retrying"),
            }
            tokio::time::sleep(self.bootstrap_interval).await;
        }
    }

    /// One poll: act when a new round has started.
    ///
    /// Returns the report of the broadcast when one happened.
    pub async fn tick(&mut self) -> Result<Option<RoundReport>> {
        if self.state == SchedulerState::Bootstrapping && !self.refresh_params().await? {
            return Ok(None);
        }

        let status = self
            .ledger
            .current_status()
            .await
            .context("Failed to fetch node status")?;
        self.latest_block_height = status.latest_block_height;

        let Some(round) = round_of(status.latest_block_height, self.vote_period) else {
            return Ok(None);
        };
        tracing::debug!(height = status.latest_block_height, round, "Polled node status");

        if self.last_prevote_round.is_some_and(|last| round <= last) {
            return Ok(None);
        }

        tracing::info!(
            height = status.latest_block_height,
            round,
            last_round = ?self.last_prevote_round,
            "🗳️ New voting round"
        );

        self.state = SchedulerState::Acting;
        let outcome = self.act(round, status.latest_block_height).await;
        self.state = SchedulerState::Idle;

        outcome.map(Some)
    }

    /// Reveal (when reconciled) and commit for `round`, then broadcast
    pub async fn act(&mut self, round: u64, height: u64) -> Result<RoundReport> {
        let prevotes = self
            .ledger
            .fetch_validator_prevotes(self.votes.validator())
            .await
            .context("Failed to fetch validator prevotes")?;

        let covered = self.votes.has_prevotes_for_all(&prevotes);
        let reconciled = self.votes.reconciles(&prevotes);
        if !covered {
            tracing::info!(
                round,
                onchain = prevotes.len(),
                "Not every denom has a prevote on-chain, skipping reveal"
            );
        }
        if !reconciled {
            tracing::warn!(round, "On-chain prevotes do not match local commits, skipping reveal");
            for pv in &prevotes {
                tracing::debug!(
                    denom = %pv.denom,
                    hash = %pv.hash,
                    voter = %pv.voter,
                    submit_block = pv.submit_block,
                    "On-chain prevote"
                );
            }
        }

        let mut msgs = Vec::new();
        if covered && reconciled {
            msgs.extend(self.votes.reveal_messages()?);
        }
        let revealed = msgs.len();

        let prices = self
            .aggregator
            .fetch_prices()
            .await
            .context("Failed to aggregate prices")?;
        // Staged until the chain accepts the tx
        let pending = self.votes.prepare(&prices)?;
        let commits = self.votes.staged_messages(&pending)?;
        let committed = commits.len();
        msgs.extend(commits);

        let result = self
            .ledger
            .sign_and_broadcast(&msgs)
            .await
            .context("Failed to broadcast oracle messages")?;

        let report = RoundReport {
            round,
            height,
            revealed,
            committed,
            tx_hash: result.tx_hash,
            code: result.code,
            acted_at: Utc::now(),
        };

        if report.accepted() {
            self.votes.apply(pending);
            self.last_prevote_round = Some(round);
            tracing::info!(
                round = report.round,
                height = report.height,
                revealed = report.revealed,
                committed = report.committed,
                tx_hash = %report.tx_hash,
                "📤 Oracle transaction accepted"
            );
        } else {
            tracing::warn!(
                round = report.round,
                code = report.code,
                tx_hash = %report.tx_hash,
                raw_log = %result.raw_log,
                "Oracle transaction rejected, retrying next poll"
            );
        }

        Ok(report)
    }

    /// Run until `shutdown` resolves.
    ///
    /// Errors and panics inside a tick are logged and the loop continues.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log_tick_error(&e),
                Err(panic) => {
                    tracing::error!(panic = %panic_message(&*panic), "❌ Round action panicked");
                    if self.state == SchedulerState::Acting {
                        self.state = SchedulerState::Idle;
                    }
                }
            }

            let pause = if self.state == SchedulerState::Bootstrapping {
                self.bootstrap_interval
            } else {
                self.poll_interval
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping feeder");
                    break;
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    }
}

fn log_tick_error(e: &anyhow::Error) {
    let invariant = e
        .chain()
        .filter_map(|cause| cause.downcast_ref::<FeederError>())
        .any(FeederError::is_invariant_violation);

    if invariant {
        tracing::error!(error = %format!("{:#}", e), "❌ Vote ledger invariant violated");
    } else {
        tracing::warn!(error = %format!("{:#}", e), "Round action failed");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
