//! Price source implementations (Band request-search feeds)

mod band;

pub use band::{BandFeed, BandSource, EXCHANGE_FIELDS};

use async_trait::async_trait;

use crate::error::Result;
use crate::oracle::{FxRates, PriceObservation};

/// Trait for price source clients
///
/// A fetch is exactly one upstream round-trip. Implementations never retry;
/// the scheduler retries on the next round boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Fetch and decode one observation record
    async fn fetch(&self) -> Result<SourceRecord>;
}

/// Decoded payload of one source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    /// Exchange quotes; negative prices mark fields the script could not fill
    Exchange(Vec<PriceObservation>),
    /// Fiat conversion table
    Fx(FxRates),
}
