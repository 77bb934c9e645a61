//! Oracle Feeder - commit-reveal exchange rate voting for a Terra validator
//!
//! Usage: FEEDER_PRIVATE_KEY=0x... ORACLE_FEEDER__FEEDER__VALIDATOR_ADDRESS=terravaloper1... oracle-feeder

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use oracle_feeder::chain::{FeederKey, LedgerClient, TerraClient};
use oracle_feeder::config::{AppConfig, PRIVATE_KEY_VAR};
use oracle_feeder::oracle::sources::{BandSource, PriceSource};
use oracle_feeder::oracle::PriceAggregator;
use oracle_feeder::scheduler::Feeder;
use oracle_feeder::vote::VoteLedger;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,oracle_feeder=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load config first so `.env` can also carry RUST_LOG
    let config = AppConfig::load()?;
    init_tracing();

    config.validate()?;
    config.validate_env()?;
    tracing::info!(config = %config, "🚀 Starting oracle feeder v{}", env!("CARGO_PKG_VERSION"));

    let validator = config.validator()?;
    let denoms = config.denoms()?;

    let private_key = std::env::var(PRIVATE_KEY_VAR)
        .with_context(|| format!("{} is not set", PRIVATE_KEY_VAR))?;
    let key = FeederKey::from_hex(&private_key)?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(concat!("oracle-feeder/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let sources: Vec<Arc<dyn PriceSource>> = vec![
        Arc::new(BandSource::exchange(http.clone(), &config.feeds)),
        Arc::new(BandSource::fx(http.clone(), &config.feeds)),
    ];
    let aggregator = PriceAggregator::new(sources, denoms.clone(), config.price_timeout());
    tracing::info!(sources = ?aggregator.source_names(), "📡 Price sources configured");

    let votes = VoteLedger::new(validator, denoms, config.feeder.salt_length);
    tracing::info!(
        validator = %votes.validator(),
        feeder = %votes.feeder(),
        public_key = %key.public_key().value,
        "🔑 Feeder account loaded"
    );

    let ledger: Arc<dyn LedgerClient> = Arc::new(TerraClient::from_config(
        http,
        &config,
        votes.feeder().to_string(),
        key,
    ));

    let mut feeder = Feeder::new(
        ledger,
        aggregator,
        votes,
        config.poll_interval(),
        config.bootstrap_interval(),
    );

    tokio::select! {
        _ = feeder.bootstrap() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested during bootstrap");
            return Ok(());
        }
    }

    feeder.run().await;
    tracing::info!("👋 Oracle feeder stopped");
    Ok(())
}
