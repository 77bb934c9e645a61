//! Configuration management for the oracle feeder
//!
//! Loads built-in defaults, optional config files and environment variables
//! (`ORACLE_FEEDER__SECTION__KEY`, `.env` honoured). The feeder key is read
//! from `FEEDER_PRIVATE_KEY` only and never stored in `AppConfig`.

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::types::{Denom, Fiat, ValidatorAddress};
use crate::vote::MAX_SALT_LENGTH;

/// Environment variable holding the feeder's hex secp256k1 key
pub const PRIVATE_KEY_VAR: &str = "FEEDER_PRIVATE_KEY";

const BROADCAST_MODES: [&str; 3] = ["block", "sync", "async"];

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub feeder: FeederConfig,
    pub node: NodeConfig,
    pub tx: TxConfig,
    pub feeds: FeedsConfig,
}

fn with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        // Feeder defaults
        .set_default("feeder.validator_address", "")?
        .set_default("feeder.chain_id", "columbus-3")?
        .set_default("feeder.denoms", vec!["ukrw", "uusd", "umnt", "usdr"])?
        .set_default("feeder.salt_length", MAX_SALT_LENGTH as u64)?
        .set_default("feeder.poll_interval_ms", 1000)?
        .set_default("feeder.bootstrap_interval_ms", 1000)?
        // Node defaults
        .set_default("node.rpc_url", "http://localhost:26657")?
        .set_default("node.lcd_url", "http://localhost:1317")?
        .set_default("node.request_timeout_ms", 10_000)?
        // Tx defaults
        .set_default("tx.gas", 200_000)?
        .set_default("tx.fee_amount", 0)?
        .set_default("tx.fee_denom", "uluna")?
        .set_default("tx.memo", "")?
        .set_default("tx.broadcast_mode", "block")?
        // Feed defaults
        .set_default("feeds.band_url", "http://poa-api.bandchain.org")?
        .set_default("feeds.exchange_script_id", 13)?
        .set_default("feeds.exchange_symbol", "LUNA")?
        .set_default("feeds.fx_script_id", 9)?
        .set_default("feeds.fx_symbols", vec!["KRW", "MNT", "XDR"])?
        .set_default("feeds.multiplier", 1_000_000)?
        .set_default("feeds.min_count", 3)?
        .set_default("feeds.ask_count", 4)?
        .set_default("feeds.timeout_ms", 20_000)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = with_defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ORACLE_FEEDER__*)
            .add_source(
                Environment::with_prefix("ORACLE_FEEDER")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("feeder.denoms")
                    .with_list_parse_key("feeds.fx_symbols"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Tracked denoms in configured order
    pub fn denoms(&self) -> Result<Vec<Denom>> {
        let mut seen = HashSet::new();
        let mut denoms = Vec::with_capacity(self.feeder.denoms.len());
        for raw in &self.feeder.denoms {
            let denom = Denom::from_str(raw)
                .with_context(|| format!("Unknown denom '{}' in feeder.denoms", raw))?;
            if !seen.insert(denom) {
                bail!("Denom {} listed twice in feeder.denoms", denom);
            }
            denoms.push(denom);
        }
        Ok(denoms)
    }

    pub fn validator(&self) -> Result<ValidatorAddress> {
        ValidatorAddress::parse(&self.feeder.validator_address)
            .context("feeder.validator_address is not a validator operator address")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.feeder.poll_interval_ms)
    }

    pub fn bootstrap_interval(&self) -> Duration {
        Duration::from_millis(self.feeder.bootstrap_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.node.request_timeout_ms)
    }

    pub fn price_timeout(&self) -> Duration {
        Duration::from_millis(self.feeds.timeout_ms)
    }

    /// Check the loaded values before anything is started
    pub fn validate(&self) -> Result<()> {
        self.validator()?;

        if self.feeder.chain_id.trim().is_empty() {
            bail!("feeder.chain_id must not be empty");
        }

        let denoms = self.denoms()?;
        if denoms.is_empty() {
            bail!("feeder.denoms must list at least one denom");
        }

        if !(1..=MAX_SALT_LENGTH).contains(&self.feeder.salt_length) {
            bail!(
                "feeder.salt_length must be between 1 and {}, got {}",
                MAX_SALT_LENGTH,
                self.feeder.salt_length
            );
        }

        if self.feeder.poll_interval_ms == 0 || self.feeder.bootstrap_interval_ms == 0 {
            bail!("feeder poll intervals must be positive");
        }

        for (key, url) in [
            ("node.rpc_url", &self.node.rpc_url),
            ("node.lcd_url", &self.node.lcd_url),
            ("feeds.band_url", &self.feeds.band_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("{} must be an http(s) URL, got '{}'", key, url);
            }
        }

        if self.node.request_timeout_ms == 0 {
            bail!("node.request_timeout_ms must be positive");
        }

        if !BROADCAST_MODES.contains(&self.tx.broadcast_mode.as_str()) {
            bail!(
                "tx.broadcast_mode must be one of {:?}, got '{}'",
                BROADCAST_MODES,
                self.tx.broadcast_mode
            );
        }

        if self.feeds.multiplier == 0 {
            bail!("feeds.multiplier must be positive");
        }
        if self.feeds.timeout_ms == 0 {
            bail!("feeds.timeout_ms must be positive");
        }
        if self.feeds.min_count == 0 || self.feeds.min_count > self.feeds.ask_count {
            bail!(
                "feeds.min_count must be in 1..=ask_count ({}), got {}",
                self.feeds.ask_count,
                self.feeds.min_count
            );
        }

        let mut fx_fiats = HashSet::new();
        for symbol in &self.feeds.fx_symbols {
            let fiat = Fiat::from_symbol(symbol)
                .with_context(|| format!("Unknown fiat symbol '{}' in feeds.fx_symbols", symbol))?;
            fx_fiats.insert(fiat);
        }
        // Quotes arrive in USD and KRW; every denom's fiat needs a USD value.
        for fiat in denoms
            .iter()
            .map(|d| d.fiat())
            .chain(std::iter::once(Fiat::Krw))
        {
            if fiat != Fiat::Usd && !fx_fiats.contains(&fiat) {
                bail!("feeds.fx_symbols must include {}", fiat);
            }
        }

        Ok(())
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "validator={} chain={} denoms={:?} rpc={} lcd={} band={} timeout_ms={}",
            self.feeder.validator_address,
            self.feeder.chain_id,
            self.feeder.denoms,
            self.node.rpc_url,
            self.node.lcd_url,
            self.feeds.band_url,
            self.feeds.timeout_ms
        )
    }

    /// Validate required environment variables
    pub fn validate_env(&self) -> Result<()> {
        let pk = std::env::var(PRIVATE_KEY_VAR)
            .with_context(|| format!("Required environment variable {} is not set", PRIVATE_KEY_VAR))?;
        check_private_key(&pk)
    }
}

fn check_private_key(pk: &str) -> Result<()> {
    let hex_part = pk.trim().trim_start_matches("0x");
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!(
            "{} must be a 32-byte hex string (64 hex chars, optional 0x prefix)",
            PRIVATE_KEY_VAR
        );
    }
    Ok(())
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALOPER: &str = "terravaloper1hwjr0j6v5s8cuwtvza9jaqz7s3nfnxyw4r6st6";

    fn config_with(overrides: &[(&str, config::Value)]) -> Result<AppConfig> {
        let mut builder = with_defaults()?.set_override("feeder.validator_address", VALOPER)?;
        for (key, value) in overrides {
            builder = builder.set_override(*key, value.clone())?;
        }
        Ok(builder.build()?.try_deserialize()?)
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = config_with(&[]).unwrap();
        cfg.validate().unwrap();

        assert_eq!(
            cfg.denoms().unwrap(),
            vec![Denom::Krw, Denom::Usd, Denom::Mnt, Denom::Sdr]
        );
        assert_eq!(cfg.feeder.salt_length, 4);
        assert_eq!(cfg.feeds.exchange_script_id, 13);
        assert_eq!(cfg.feeds.fx_script_id, 9);
        assert_eq!(cfg.feeds.multiplier, 1_000_000);
        assert_eq!(cfg.price_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_validator_address_is_rejected() {
        let cfg = config_with(&[("feeder.validator_address", "".into())]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_salt_length_is_rejected() {
        for len in [0u64, 5] {
            let cfg = config_with(&[("feeder.salt_length", len.into())]).unwrap();
            assert!(cfg.validate().is_err(), "salt length {} accepted", len);
        }
    }

    #[test]
    fn empty_or_unknown_denoms_are_rejected() {
        let empty: Vec<String> = Vec::new();
        let cfg = config_with(&[("feeder.denoms", empty.into())]).unwrap();
        assert!(cfg.validate().is_err());

        let cfg = config_with(&[("feeder.denoms", vec!["ukrw", "ueur"].into())]).unwrap();
        assert!(cfg.validate().is_err());

        let cfg = config_with(&[("feeder.denoms", vec!["ukrw", "ukrw"].into())]).unwrap();
        assert!(cfg.denoms().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = config_with(&[("feeds.timeout_ms", 0u64.into())]).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fx_symbols_must_cover_tracked_denoms() {
        let cfg = config_with(&[("feeds.fx_symbols", vec!["KRW", "MNT"].into())]).unwrap();
        assert!(cfg.validate().is_err());

        let cfg = config_with(&[
            ("feeder.denoms", vec!["ukrw", "uusd"].into()),
            ("feeds.fx_symbols", vec!["KRW"].into()),
        ])
        .unwrap();
        cfg.validate().unwrap();
    }

    #[test]
    fn private_key_format_is_checked() {
        assert!(check_private_key(
            "0x59c6995e998f97a5a0044966f0945387dc9f5a59e86cdc84e64546a1d8f76d59"
        )
        .is_ok());
        assert!(check_private_key(
            "59c6995e998f97a5a0044966f0945387dc9f5a59e86cdc84e64546a1d8f76d59"
        )
        .is_ok());
        assert!(check_private_key("0x1234").is_err());
    }

    #[test]
    fn digest_has_no_secrets() {
        let cfg = config_with(&[]).unwrap();
        let digest = cfg.to_string();
        assert!(digest.contains(VALOPER));
        assert!(!digest.contains("PRIVATE"));
    }
}
