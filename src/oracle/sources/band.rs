//! Band request-search REST client
//!
//! Both feeds are oracle scripts resolved on BandChain. The feeder asks the
//! REST endpoint for the latest resolved request matching the script id and
//! calldata, then decodes the OBI result payload.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::FeedsConfig;
use crate::error::{FeederError, Result};
use crate::oracle::obi;
use crate::oracle::sources::{PriceSource, SourceRecord};
use crate::oracle::{FxRates, PriceObservation};
use crate::types::Fiat;

/// Field order of the exchange script result, with the fiat each is quoted in
pub const EXCHANGE_FIELDS: [(&str, Fiat); 7] = [
    ("cryptocompare", Fiat::Usd),
    ("coingecko", Fiat::Usd),
    ("huobipro", Fiat::Usd),
    ("bittrex", Fiat::Usd),
    ("bithumb", Fiat::Krw),
    ("coinone", Fiat::Krw),
    ("coinmarketcap", Fiat::Usd),
];

#[derive(Debug, Deserialize)]
struct BandResponse {
    result: BandResult,
}

#[derive(Debug, Deserialize)]
struct BandResult {
    result: Option<BandPacket>,
}

#[derive(Debug, Deserialize)]
struct BandPacket {
    response_packet_data: ResponsePacket,
}

#[derive(Debug, Deserialize)]
struct ResponsePacket {
    #[serde(default)]
    request_id: Option<String>,
    result: String,
}

/// Which oracle script a source queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BandFeed {
    /// LUNA quotes from seven exchanges
    Exchange { symbol: String },
    /// USD value of each fiat symbol
    Fx { symbols: Vec<String> },
}

/// One Band oracle script as a price source
#[derive(Debug, Clone)]
pub struct BandSource {
    name: &'static str,
    client: Client,
    base_url: String,
    oracle_script_id: u64,
    feed: BandFeed,
    multiplier: u64,
    min_count: u64,
    ask_count: u64,
}

impl BandSource {
    /// Exchange quote feed described by the config
    pub fn exchange(client: Client, cfg: &FeedsConfig) -> Self {
        Self {
            name: "band-exchange",
            client,
            base_url: cfg.band_url.trim_end_matches('/').to_string(),
            oracle_script_id: cfg.exchange_script_id,
            feed: BandFeed::Exchange {
                symbol: cfg.exchange_symbol.clone(),
            },
            multiplier: cfg.multiplier,
            min_count: cfg.min_count,
            ask_count: cfg.ask_count,
        }
    }

    /// Fiat conversion feed described by the config
    pub fn fx(client: Client, cfg: &FeedsConfig) -> Self {
        Self {
            name: "band-fx",
            client,
            base_url: cfg.band_url.trim_end_matches('/').to_string(),
            oracle_script_id: cfg.fx_script_id,
            feed: BandFeed::Fx {
                symbols: cfg.fx_symbols.clone(),
            },
            multiplier: cfg.multiplier,
            min_count: cfg.min_count,
            ask_count: cfg.ask_count,
        }
    }

    fn calldata(&self) -> Vec<u8> {
        match &self.feed {
            BandFeed::Exchange { symbol } => obi::exchange_calldata(symbol, self.multiplier),
            BandFeed::Fx { symbols } => obi::fx_calldata(symbols, self.multiplier),
        }
    }

    /// Request-search URL for this script and calldata
    pub fn request_url(&self) -> String {
        format!(
            "{}/oracle/request_search?oid={}&calldata={}&min_count={}&ask_count={}",
            self.base_url,
            self.oracle_script_id,
            hex::encode(self.calldata()),
            self.min_count,
            self.ask_count
        )
    }

    /// Extract the raw OBI result from a request-search response body
    fn extract_payload(&self, body: &str) -> Result<Vec<u8>> {
        let response: BandResponse = serde_json::from_str(body)
            .map_err(|e| FeederError::decode(self.name, format!("invalid response json: {}", e)))?;

        let packet = response
            .result
            .result
            .ok_or_else(|| FeederError::decode(self.name, "request has not been resolved yet"))?;

        tracing::debug!(
            source = self.name,
            request_id = packet.response_packet_data.request_id.as_deref().unwrap_or("-"),
            "Band request resolved"
        );

        general_purpose::STANDARD
            .decode(packet.response_packet_data.result.trim())
            .map_err(|e| FeederError::decode(self.name, format!("invalid base64 result: {}", e)))
    }

    /// Decode the OBI payload according to the feed kind
    pub fn decode_payload(&self, payload: &[u8]) -> Result<SourceRecord> {
        let multiplier = Decimal::from(self.multiplier);

        match &self.feed {
            BandFeed::Exchange { .. } => {
                let fields: [i64; 7] = obi::decode_i64_fields(self.name, payload)?;
                // Negative fields are the "missing" sentinel; they are kept
                // here and excluded by the aggregator.
                let observations = EXCHANGE_FIELDS
                    .iter()
                    .zip(fields.iter())
                    .map(|(&(exchange, fiat), &raw)| {
                        PriceObservation::new(exchange, fiat, Decimal::from(raw) / multiplier)
                    })
                    .collect();
                Ok(SourceRecord::Exchange(observations))
            }
            BandFeed::Fx { symbols } => {
                let values = obi::decode_u64_vec(self.name, payload, symbols.len())?;
                let mut rates = FxRates::new();
                for (symbol, raw) in symbols.iter().zip(values) {
                    let fiat = Fiat::from_symbol(symbol).ok_or_else(|| {
                        FeederError::InvalidConfig(format!("unknown fx symbol '{}'", symbol))
                    })?;
                    rates.insert(fiat, Decimal::from(raw) / multiplier);
                }
                Ok(SourceRecord::Fx(rates))
            }
        }
    }
}

#[async_trait]
impl PriceSource for BandSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self) -> Result<SourceRecord> {
        let url = self.request_url();

        tracing::debug!(source = self.name, url = %url, "📥 Fetching Band request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeederError::network(self.name, e))?;

        if !response.status().is_success() {
            return Err(FeederError::network(
                self.name,
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FeederError::network(self.name, e))?;

        let payload = self.extract_payload(&body)?;
        self.decode_payload(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::obi::ObiWriter;
    use rust_decimal_macros::dec;

    fn feeds_config() -> FeedsConfig {
        FeedsConfig {
            band_url: "http://band.test/".to_string(),
            exchange_script_id: 13,
            exchange_symbol: "LUNA".to_string(),
            fx_script_id: 9,
            fx_symbols: vec!["KRW".to_string(), "MNT".to_string(), "XDR".to_string()],
            multiplier: 1_000_000,
            min_count: 3,
            ask_count: 4,
            timeout_ms: 20_000,
        }
    }

    fn response_body(payload: &[u8]) -> String {
        serde_json::json!({
            "height": "1200",
            "result": {
                "request": { "oracle_script_id": "13" },
                "reports": [],
                "result": {
                    "request_packet_data": { "client_id": "", "oracle_script_id": "13" },
                    "response_packet_data": {
                        "client_id": "",
                        "request_id": "77",
                        "ans_count": "4",
                        "resolve_status": 1,
                        "result": general_purpose::STANDARD.encode(payload)
                    }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn request_url_carries_script_and_calldata() {
        let source = BandSource::exchange(Client::new(), &feeds_config());
        assert_eq!(
            source.request_url(),
            "http://band.test/oracle/request_search?oid=13&calldata=000000044c554e4100000000000f4240&min_count=3&ask_count=4"
        );
    }

    #[test]
    fn exchange_payload_decodes_every_field_in_order() {
        let source = BandSource::exchange(Client::new(), &feeds_config());
        let payload = [
            1_500_000i64,  // cryptocompare 1.5 USD
            -1,            // coingecko missing
            1_510_000,     // huobipro
            1_490_000,     // bittrex
            1_800_000_000, // bithumb 1800 KRW
            -1,            // coinone missing
            1_505_000,     // coinmarketcap
        ]
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .collect::<Vec<u8>>();

        let body = response_body(&payload);
        let bytes = source.extract_payload(&body).unwrap();
        let record = source.decode_payload(&bytes).unwrap();

        match record {
            SourceRecord::Exchange(obs) => {
                assert_eq!(obs.len(), 7);
                assert_eq!(obs[0].source, "cryptocompare");
                assert_eq!(obs[0].price, dec!(1.5));
                assert!(obs[1].price.is_sign_negative());
                assert_eq!(obs[4].source, "bithumb");
                assert_eq!(obs[4].fiat, Fiat::Krw);
                assert_eq!(obs[4].price, dec!(1800));
            }
            other => panic!("expected exchange record, got {:?}", other),
        }
    }

    #[test]
    fn fx_payload_maps_symbols_to_fiat() {
        let source = BandSource::fx(Client::new(), &feeds_config());
        let payload = ObiWriter::new()
            .u32(3)
            .u64(850)       // 0.00085 USD per KRW
            .u64(350)       // 0.00035 USD per MNT
            .u64(1_380_000) // 1.38 USD per XDR
            .finish();

        match source.decode_payload(&payload).unwrap() {
            SourceRecord::Fx(rates) => {
                assert_eq!(rates.usd_value(Fiat::Krw), Some(dec!(0.00085)));
                assert_eq!(rates.usd_value(Fiat::Mnt), Some(dec!(0.00035)));
                assert_eq!(rates.usd_value(Fiat::Xdr), Some(dec!(1.38)));
                assert_eq!(rates.usd_value(Fiat::Usd), Some(Decimal::ONE));
            }
            other => panic!("expected fx record, got {:?}", other),
        }
    }

    #[test]
    fn short_payload_is_a_shape_error() {
        let source = BandSource::exchange(Client::new(), &feeds_config());
        let err = source.decode_payload(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, FeederError::Shape { expected: 56, actual: 32, .. }));
    }

    #[test]
    fn unresolved_request_is_a_decode_error() {
        let source = BandSource::fx(Client::new(), &feeds_config());
        let body = serde_json::json!({ "height": "1", "result": { "result": null } }).to_string();
        assert!(matches!(
            source.extract_payload(&body),
            Err(FeederError::Decode { .. })
        ));
        assert!(matches!(
            source.extract_payload("<html>"),
            Err(FeederError::Decode { .. })
        ));
    }
}
