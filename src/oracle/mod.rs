//! Oracle module - Multi-source price aggregation
//!
//! Collects LUNA quotes from the exchange feed and fiat conversion rates from
//! the fx feed, then produces one consensus exchange rate per tracked denom.

mod aggregator;
pub mod obi;
pub mod sources;

pub use aggregator::{median, PriceAggregator, PriceMap};

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::types::Fiat;

/// One upstream quote, unscaled, in the fiat unit it was reported in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceObservation {
    pub source: &'static str,
    pub fiat: Fiat,
    pub price: Decimal,
}

impl PriceObservation {
    pub fn new(source: &'static str, fiat: Fiat, price: Decimal) -> Self {
        Self { source, fiat, price }
    }
}

/// USD value of one unit of each fiat reported by the fx feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FxRates {
    usd_per_unit: BTreeMap<Fiat, Decimal>,
}

impl FxRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fiat: Fiat, usd_per_unit: Decimal) {
        self.usd_per_unit.insert(fiat, usd_per_unit);
    }

    pub fn with(mut self, fiat: Fiat, usd_per_unit: Decimal) -> Self {
        self.insert(fiat, usd_per_unit);
        self
    }

    /// USD value of one unit of `fiat`; USD itself is always 1.
    /// Non-positive rates are treated as absent.
    pub fn usd_value(&self, fiat: Fiat) -> Option<Decimal> {
        if fiat == Fiat::Usd {
            return Some(Decimal::ONE);
        }
        self.usd_per_unit
            .get(&fiat)
            .copied()
            .filter(|v| v.is_sign_positive() && !v.is_zero())
    }

    pub fn len(&self) -> usize {
        self.usd_per_unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usd_per_unit.is_empty()
    }
}
