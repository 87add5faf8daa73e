//! Result-cache protocol.
//!
//! Keyed by `(symbol, analysis_date)` where the analysis date is the last
//! observation the sweep saw. A cached entry is served only when its
//! analysis date matches the latest requested price date; anything else, a
//! forced call, or a read failure recomputes. Writes replace the symbol's
//! entry wholesale (newest analysis date wins) and a failed write is
//! recovered: the caller still gets the analysis, flagged as unpersisted.

use chrono::NaiveDate;

use crate::data::ResultStore;
use crate::engine::types::CachedAnalysis;
use crate::error::EngineError;

/// Read protocol: the entry to serve without recomputing, if any. Only an
/// entry whose analysis date matches the latest requested price date is a
/// hit; its per-window details are guaranteed to describe that exact series.
pub fn lookup(
    store: &dyn ResultStore,
    symbol: &str,
    latest_price_date: NaiveDate,
    force: bool,
) -> Option<CachedAnalysis> {
    if force {
        tracing::debug!(%symbol, "forced recompute, bypassing cache");
        return None;
    }
    match store.get_latest(symbol) {
        Ok(Some(entry)) if entry.analysis_date == latest_price_date => {
            tracing::debug!(
                %symbol,
                analysis_date = %entry.analysis_date,
                "serving cached analysis"
            );
            Some(entry)
        }
        Ok(Some(entry)) => {
            // Older: stale. Newer: the caller asked for a shorter history
            // than the stored sweep covers; recompute for that period.
            tracing::debug!(
                %symbol,
                analysis_date = %entry.analysis_date,
                %latest_price_date,
                "cached analysis does not match requested period"
            );
            None
        }
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(%symbol, %err, "cache read failed, recomputing");
            None
        }
    }
}

/// Write protocol: persist a fresh analysis. Returns whether the write stuck;
/// a failure is recovered into [`EngineError::CachePersist`] for logging,
/// never propagated.
pub fn persist(store: &dyn ResultStore, entry: &CachedAnalysis) -> bool {
    debug_assert_eq!(entry.analysis_date, entry.last_price_date);
    match store.put(entry) {
        Ok(()) => true,
        Err(source) => {
            let err = EngineError::CachePersist {
                symbol: entry.symbol.clone(),
                source,
            };
            tracing::warn!(%err, "returning unpersisted result");
            false
        }
    }
}
