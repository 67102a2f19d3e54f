pub mod pmu;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::db::models::{RaceCard, RaceResult};

/// Why the upstream racing-data source produced nothing usable.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The race exists in no programme the provider knows about, or its
    /// data is not published yet. Callers report this as-is, they never
    /// score a partial card.
    #[error("no race data for {0}")]
    NoData(String),

    #[error("provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("unreadable provider payload: {0}")]
    Malformed(String),
}

/// Trait that every racing-data provider must implement.
#[async_trait]
pub trait RaceDataProvider: Send + Sync {
    /// Fetch the pre-race card: declared runners minus confirmed
    /// non-starters, which are reported separately on the card.
    async fn fetch_race(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<RaceCard, ProviderError>;

    /// Fetch the post-race finish order for settlement.
    async fn fetch_result(
        &self,
        date: NaiveDate,
        meeting: u32,
        race: u32,
    ) -> Result<RaceResult, ProviderError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
