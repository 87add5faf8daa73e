pub mod memory;
pub mod series;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::engine::types::CachedAnalysis;

/// Daily close feed. Implementations return business-day closes in ascending
/// date order with `dates.len() == closes.len()`. Mockable in tests.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn daily_closes(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(Vec<NaiveDate>, Vec<f64>)>;
}

/// Latest-analysis persistence. The store keeps at most one entry per symbol;
/// `put` replaces any prior entry wholesale, so readers never observe a
/// partially updated analysis.
pub trait ResultStore: Send + Sync {
    fn get_latest(&self, symbol: &str) -> Result<Option<CachedAnalysis>>;

    fn put(&self, analysis: &CachedAnalysis) -> Result<()>;
}
