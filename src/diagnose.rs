//! Diagnosis facade.
//!
//! The one entry point external collaborators call: fetch prices, decide
//! cache freshness, run the multi-window sweep on a blocking thread, persist,
//! and assemble the JSON-facing response. Price I/O at the start and the
//! store write at the end are the only suspension points; the sweep itself is
//! CPU-bound and runs off the async executor.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use garde::Validate;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cache;
use crate::config::AnalysisConfig;
use crate::data::series::PriceSeries;
use crate::data::{PriceSource, ResultStore};
use crate::engine::sweep;
use crate::engine::types::{
    AnalysisPeriod, CachedAnalysis, DiagnosisResponse, RepresentativeFit, SweepStatistics,
    WindowRange,
};
use crate::engine::{forecast, types::FitResult};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Default, Deserialize, JsonSchema)]
pub struct DiagnoseParams {
    /// Analyze prices up to this date (default: everything available)
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Recompute even when a current cached analysis exists (default: false)
    #[serde(default)]
    pub force: bool,
}

pub struct Diagnoser {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn ResultStore>,
    config: AnalysisConfig,
}

impl Diagnoser {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn ResultStore>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Diagnose one symbol. See [`Diagnoser::diagnose_with_cancel`].
    pub async fn diagnose(
        &self,
        symbol: &str,
        params: DiagnoseParams,
    ) -> Result<DiagnosisResponse, EngineError> {
        self.diagnose_with_cancel(symbol, params, &CancellationToken::new())
            .await
    }

    /// Diagnose one symbol, honoring a caller-held cancellation token.
    /// Cancellation is cooperative: workers observe the token between window
    /// fits, and a sweep cut short with fewer than 10 successful fits
    /// surfaces as [`EngineError::AnalysisTimeout`].
    pub async fn diagnose_with_cancel(
        &self,
        symbol: &str,
        params: DiagnoseParams,
        cancel: &CancellationToken,
    ) -> Result<DiagnosisResponse, EngineError> {
        // Config fields are public; reject a hand-built invalid configuration
        // up front instead of panicking mid-sweep.
        if let Err(report) = self.config.validate() {
            return Err(EngineError::InvalidInput {
                symbol: symbol.to_string(),
                reason: format!("invalid analysis configuration: {report}"),
            });
        }

        let (mut dates, mut closes) = self
            .source
            .daily_closes(symbol, None, params.end_date)
            .await
            .map_err(|source| EngineError::PriceSource {
                symbol: symbol.to_string(),
                source,
            })?;
        if let Some(end) = params.end_date {
            let cut = dates.partition_point(|d| *d <= end);
            dates.truncate(cut);
            closes.truncate(cut);
        }
        let series = PriceSeries::new(symbol, dates, closes)?;
        let latest = series.last_date();

        let cached = {
            let store = Arc::clone(&self.store);
            let sym = symbol.to_string();
            let force = params.force;
            tokio::task::spawn_blocking(move || cache::lookup(store.as_ref(), &sym, latest, force))
                .await
                .unwrap_or_else(|err| {
                    tracing::warn!(%symbol, %err, "cache lookup task failed");
                    None
                })
        };
        if let Some(entry) = cached {
            return Ok(self.build_response(&series, &entry, true, true));
        }

        let outcome = {
            let series = series.clone();
            let config = self.config.clone();
            let cancel = cancel.clone();
            let handle =
                tokio::task::spawn_blocking(move || sweep::run_sweep(&series, &config, &cancel));
            match handle.await {
                Ok(result) => result?,
                Err(err) => match err.try_into_panic() {
                    Ok(payload) => std::panic::resume_unwind(payload),
                    // Runtime shutdown: the sweep was cancelled before it
                    // produced anything.
                    Err(_) => {
                        return Err(EngineError::AnalysisTimeout {
                            symbol: symbol.to_string(),
                            successful_fits: 0,
                        })
                    }
                },
            }
        };

        let entry = CachedAnalysis {
            symbol: symbol.to_string(),
            analysis_date: latest,
            last_price_date: latest,
            window_min: outcome.window_min,
            window_max: outcome.window_max,
            window_step: outcome.window_step,
            report: outcome.report,
            representative: outcome.representative,
            created_at: Utc::now().naive_utc(),
        };

        let persisted = {
            let store = Arc::clone(&self.store);
            let entry = entry.clone();
            tokio::task::spawn_blocking(move || cache::persist(store.as_ref(), &entry))
                .await
                .unwrap_or(false)
        };

        Ok(self.build_response(&series, &entry, false, persisted))
    }

    fn build_response(
        &self,
        series: &PriceSeries,
        entry: &CachedAnalysis,
        cached: bool,
        persisted: bool,
    ) -> DiagnosisResponse {
        let report = &entry.report;
        let representative_fit = entry
            .representative
            .as_ref()
            .and_then(|fit| self.chart_fit(fit, series));
        let estimated_critical_date = entry
            .representative
            .as_ref()
            .and_then(forecast::critical_date);

        let summary = summarize(
            &entry.symbol,
            report.state.as_str(),
            report.confidence_indicator,
            report.bubble_windows,
            report.successful_fits,
            estimated_critical_date,
        );

        DiagnosisResponse {
            symbol: entry.symbol.clone(),
            state: report.state,
            confidence_indicator: report.confidence_indicator,
            analysis_period: AnalysisPeriod {
                start: series.first_date(),
                end: series.last_date(),
                days: series.len(),
            },
            window_range: WindowRange {
                min: entry.window_min,
                max: entry.window_max,
                step: entry.window_step,
            },
            statistics: SweepStatistics {
                total_windows: report.total_windows,
                successful_fits: report.successful_fits,
                bubble_windows: report.bubble_windows,
                success_rate: report.success_rate,
            },
            representative_fit,
            detailed_results: report.windows.clone(),
            estimated_critical_date,
            timed_out: report.timed_out,
            summary,
            cached,
            cache_persisted: persisted,
        }
    }

    fn chart_fit(&self, fit: &FitResult, series: &PriceSeries) -> Option<RepresentativeFit> {
        let parameters = fit.params?;
        Some(RepresentativeFit {
            parameters,
            fitted_points: forecast::fitted_points(fit, series),
            forecast_points: forecast::forecast_points(
                fit,
                fit.end_date,
                self.config.forecast_days,
            ),
        })
    }
}

fn summarize(
    symbol: &str,
    state: &str,
    ci: f64,
    bubble_windows: usize,
    successful_fits: usize,
    critical_date: Option<NaiveDate>,
) -> String {
    let mut text = format!(
        "{symbol}: {state}, confidence indicator {ci:.1} ({bubble_windows} of {successful_fits} successful fits satisfy the bubble constraints)."
    );
    if let Some(date) = critical_date {
        text.push_str(&format!(" Estimated critical time: {date}."));
    }
    text
}
