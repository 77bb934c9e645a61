//! Oracle Aggregator - Combines price data from multiple sources
//!
//! Runs every configured source concurrently under one deadline, converts
//! each exchange quote into every tracked denom's fiat unit and reduces the
//! candidates to a median. Any source failure or a missed deadline fails the
//! whole cycle: the feeder never votes on partially verified data.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{FeederError, Result};
use crate::oracle::sources::{PriceSource, SourceRecord};
use crate::oracle::{FxRates, PriceObservation};
use crate::types::{normalize_rate, Denom};

/// One aggregated rate per tracked denom
pub type PriceMap = BTreeMap<Denom, Decimal>;

/// Median of `values`, sorted in place by numeric value.
///
/// For an even count the upper-middle element is returned.
pub fn median(values: &mut [Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    values.sort();
    Some(values[values.len() / 2])
}

/// Price aggregator that combines data from multiple sources
pub struct PriceAggregator {
    sources: Vec<Arc<dyn PriceSource>>,
    denoms: Vec<Denom>,
    timeout: Duration,
}

impl PriceAggregator {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, denoms: Vec<Denom>, timeout: Duration) -> Self {
        Self {
            sources,
            denoms,
            timeout,
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch from every source and reduce to one rate per denom
    pub async fn fetch_prices(&self) -> Result<PriceMap> {
        let records = self.collect().await?;
        let prices = self.reduce(records)?;

        tracing::info!(
            prices = %format_prices(&prices),
            "🌟 Aggregated exchange rates"
        );

        Ok(prices)
    }

    /// Run all sources concurrently and wait for every one of them.
    ///
    /// Records are returned ordered by source name. Dropping the join set on
    /// an early return aborts requests that are still in flight.
    pub async fn collect(&self) -> Result<Vec<(&'static str, SourceRecord)>> {
        let expected = self.sources.len();
        let (tx, mut rx) = mpsc::channel::<(&'static str, Result<SourceRecord>)>(expected.max(1));
        let mut tasks = JoinSet::new();

        for source in &self.sources {
            let source = Arc::clone(source);
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = source.fetch().await;
                let _ = tx.send((source.name(), result)).await;
            });
        }
        drop(tx);

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut records = Vec::with_capacity(expected);

        while records.len() < expected {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((name, Ok(record)))) => {
                    tracing::debug!(source = name, "Source reported");
                    records.push((name, record));
                }
                Ok(Some((name, Err(e)))) => {
                    tracing::warn!(source = name, error = %e, "Source failed, abandoning price cycle");
                    return Err(e);
                }
                Ok(None) => {
                    return Err(FeederError::network(
                        "aggregator",
                        format!(
                            "{} of {} source tasks ended without reporting",
                            expected - records.len(),
                            expected
                        ),
                    ));
                }
                Err(_) => {
                    return Err(FeederError::Timeout {
                        elapsed: started.elapsed(),
                        received: records.len(),
                        expected,
                    });
                }
            }
        }

        records.sort_by_key(|(name, _)| *name);
        Ok(records)
    }

    /// Convert and reduce source records to one rate per tracked denom
    pub fn reduce(&self, records: Vec<(&'static str, SourceRecord)>) -> Result<PriceMap> {
        let mut observations: Vec<PriceObservation> = Vec::new();
        let mut fx = FxRates::new();
        let mut fx_seen = false;

        for (name, record) in records {
            match record {
                SourceRecord::Exchange(obs) => observations.extend(obs),
                SourceRecord::Fx(rates) => {
                    if fx_seen {
                        tracing::warn!(source = name, "Ignoring additional fx record");
                        continue;
                    }
                    fx = rates;
                    fx_seen = true;
                }
            }
        }

        if fx.is_empty() {
            tracing::warn!("No fx rates received, only USD quotes can be converted");
        }

        let usable: Vec<&PriceObservation> = observations
            .iter()
            .filter(|o| !o.price.is_sign_negative())
            .collect();

        tracing::info!(
            quotes = %format_observations(&observations),
            usable = usable.len(),
            fx_rates = fx.len(),
            "🌕 Exchange quotes collected"
        );

        let mut prices = PriceMap::new();
        for &denom in &self.denoms {
            let target_usd = fx
                .usd_value(denom.fiat())
                .ok_or(FeederError::MissingFxRate(denom.fiat()))?;

            let mut candidates = Vec::with_capacity(usable.len());
            for obs in &usable {
                let obs_usd = fx
                    .usd_value(obs.fiat)
                    .ok_or(FeederError::MissingFxRate(obs.fiat))?;
                let converted = obs
                    .price
                    .checked_mul(obs_usd)
                    .and_then(|v| v.checked_div(target_usd))
                    .ok_or_else(|| {
                        FeederError::decode(
                            obs.source,
                            format!("rate conversion to {} overflowed", denom),
                        )
                    })?;
                candidates.push(converted);
            }

            let rate = median(&mut candidates).ok_or(FeederError::NoCandidates(denom))?;
            prices.insert(denom, normalize_rate(rate));
        }

        Ok(prices)
    }
}

fn format_observations(observations: &[PriceObservation]) -> String {
    observations
        .iter()
        .map(|o| format!("{}={}{}", o.source, o.price.round_dp(5), o.fiat))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn format_prices(prices: &PriceMap) -> String {
    prices
        .iter()
        .map(|(denom, rate)| format!("{}={}", denom, rate.round_dp(5)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::MockPriceSource;
    use crate::types::Fiat;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn fx() -> FxRates {
        FxRates::new()
            .with(Fiat::Krw, dec!(0.001))
            .with(Fiat::Mnt, dec!(0.0004))
            .with(Fiat::Xdr, dec!(1.25))
    }

    fn exchange(prices: &[(&'static str, Fiat, Decimal)]) -> SourceRecord {
        SourceRecord::Exchange(
            prices
                .iter()
                .map(|&(s, f, p)| PriceObservation::new(s, f, p))
                .collect(),
        )
    }

    fn mock_source(name: &'static str, record: SourceRecord) -> Arc<dyn PriceSource> {
        let mut mock = MockPriceSource::new();
        mock.expect_name().return_const(name);
        mock.expect_fetch().returning(move || Ok(record.clone()));
        Arc::new(mock)
    }

    struct StalledSource;

    #[async_trait]
    impl PriceSource for StalledSource {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn fetch(&self) -> Result<SourceRecord> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(SourceRecord::Fx(FxRates::new()))
        }
    }

    fn aggregator(sources: Vec<Arc<dyn PriceSource>>) -> PriceAggregator {
        PriceAggregator::new(sources, Denom::ALL.to_vec(), Duration::from_millis(200))
    }

    #[test]
    fn median_of_odd_count_is_middle_value() {
        let mut values = vec![dec!(10), dec!(12), dec!(11)];
        assert_eq!(median(&mut values), Some(dec!(11)));
    }

    #[test]
    fn median_of_even_count_is_upper_middle() {
        let mut values = vec![dec!(10), dec!(12)];
        assert_eq!(median(&mut values), Some(dec!(12)));

        let mut values = vec![dec!(4), dec!(1), dec!(3), dec!(2)];
        assert_eq!(median(&mut values), Some(dec!(3)));
    }

    #[test]
    fn median_of_nothing_is_none() {
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn reduce_converts_between_fiat_units() {
        let agg = aggregator(Vec::new());
        let records = vec![
            (
                "band-exchange",
                exchange(&[
                    ("a", Fiat::Usd, dec!(1.0)),
                    ("b", Fiat::Usd, dec!(1.2)),
                    ("c", Fiat::Krw, dec!(1100)), // 1.1 USD
                ]),
            ),
            ("band-fx", SourceRecord::Fx(fx())),
        ];

        let prices = agg.reduce(records).unwrap();
        assert_eq!(prices[&Denom::Usd], dec!(1.1));
        assert_eq!(prices[&Denom::Krw], dec!(1100));
        assert_eq!(prices[&Denom::Mnt], dec!(2750));
        assert_eq!(prices[&Denom::Sdr], dec!(0.88));
    }

    #[test]
    fn reduce_excludes_negative_sentinels() {
        let agg = aggregator(Vec::new());
        let records = vec![
            (
                "band-exchange",
                exchange(&[
                    ("a", Fiat::Usd, dec!(-0.000001)),
                    ("b", Fiat::Usd, dec!(2)),
                    ("c", Fiat::Krw, dec!(-1)),
                ]),
            ),
            ("band-fx", SourceRecord::Fx(fx())),
        ];

        let prices = agg.reduce(records).unwrap();
        assert_eq!(prices[&Denom::Usd], dec!(2));
        assert_eq!(prices[&Denom::Krw], dec!(2000));
    }

    #[test]
    fn reduce_fails_without_candidates() {
        let agg = aggregator(Vec::new());
        let records = vec![
            ("band-exchange", exchange(&[("a", Fiat::Usd, dec!(-1))])),
            ("band-fx", SourceRecord::Fx(fx())),
        ];

        assert!(matches!(
            agg.reduce(records),
            Err(FeederError::NoCandidates(Denom::Krw))
        ));
    }

    #[test]
    fn reduce_fails_without_fx_rates() {
        let agg = aggregator(Vec::new());
        let records = vec![("band-exchange", exchange(&[("a", Fiat::Usd, dec!(1))]))];

        assert!(matches!(
            agg.reduce(records),
            Err(FeederError::MissingFxRate(Fiat::Krw))
        ));
    }

    #[tokio::test]
    async fn fetch_prices_is_deterministic() {
        let sources = || {
            vec![
                mock_source(
                    "band-exchange",
                    exchange(&[
                        ("a", Fiat::Usd, dec!(1.013)),
                        ("b", Fiat::Krw, dec!(1021.7)),
                        ("c", Fiat::Usd, dec!(0.997)),
                        ("d", Fiat::Krw, dec!(1003.3)),
                    ]),
                ),
                mock_source("band-fx", SourceRecord::Fx(fx())),
            ]
        };

        let first = aggregator(sources()).fetch_prices().await.unwrap();
        let second = aggregator(sources()).fetch_prices().await.unwrap();

        assert_eq!(first, second);
        for denom in Denom::ALL {
            assert_eq!(first[&denom].serialize(), second[&denom].serialize());
        }
    }

    #[tokio::test]
    async fn one_failing_source_fails_the_cycle() {
        let mut failing = MockPriceSource::new();
        failing.expect_name().return_const("band-fx");
        failing
            .expect_fetch()
            .returning(|| Err(FeederError::network("band-fx", "connection refused")));

        let agg = aggregator(vec![
            mock_source("band-exchange", exchange(&[("a", Fiat::Usd, dec!(1))])),
            Arc::new(failing),
        ]);

        assert!(matches!(
            agg.fetch_prices().await,
            Err(FeederError::Network { .. })
        ));
    }

    #[tokio::test]
    async fn stalled_source_times_out_the_cycle() {
        let agg = aggregator(vec![
            mock_source("band-exchange", exchange(&[("a", Fiat::Usd, dec!(1))])),
            Arc::new(StalledSource),
        ]);

        match agg.fetch_prices().await {
            Err(FeederError::Timeout {
                received, expected, ..
            }) => {
                assert_eq!(received, 1);
                assert_eq!(expected, 2);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
