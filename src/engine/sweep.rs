//! Multi-window sweep.
//!
//! Fits the trailing `W`-observation window for every `W` in the configured
//! grid and condenses the per-window bubble classifications into the
//! confidence indicator. Windows are independent and fitted in parallel on a
//! bounded pool; the summary list is emitted in ascending `W` order no matter
//! which worker finishes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use garde::Validate;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::AnalysisConfig;
use crate::data::series::{PriceSeries, MIN_OBSERVATIONS};
use crate::engine::classifier;
use crate::engine::fitter::{fit_window, FitScratch};
use crate::engine::types::{ConfidenceReport, FitResult, WindowSummary};
use crate::error::EngineError;

/// Fewest successful fits a deadline-cut sweep may report partially.
const MIN_PARTIAL_FITS: usize = 10;

#[derive(Debug)]
pub struct SweepOutcome {
    pub report: ConfidenceReport,
    pub representative: Option<FitResult>,
    pub window_min: usize,
    pub window_max: usize,
    pub window_step: usize,
}

/// Window sizes to sweep for a series of `n` observations.
///
/// The grid never exceeds the series itself; for series shorter than the
/// configured minimum the bounds collapse to `[max(30, n/6), n]` so short
/// histories still get a usable sweep.
pub fn window_grid(n: usize, config: &AnalysisConfig) -> Result<Vec<usize>, (usize, usize)> {
    if n < MIN_OBSERVATIONS {
        return Err((n, MIN_OBSERVATIONS));
    }
    let (min, max) = if n < config.window_min {
        ((n / 6).max(MIN_OBSERVATIONS), n)
    } else {
        (config.window_min.max(MIN_OBSERVATIONS), config.window_max.min(n))
    };
    Ok((min..=max)
        .step_by(config.window_step.max(1))
        .collect())
}

/// Run the sweep. Blocking and CPU-bound; callers on an async runtime are
/// expected to move it onto a blocking thread.
pub fn run_sweep(
    series: &PriceSeries,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> Result<SweepOutcome, EngineError> {
    let deadline = Instant::now() + std::time::Duration::from_secs(config.timeout_seconds);
    run_sweep_until(series, config, cancel, deadline)
}

fn run_sweep_until(
    series: &PriceSeries,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<SweepOutcome, EngineError> {
    // Config fields are public, so a caller can bypass the TOML loader;
    // re-check here rather than panic on a zero step or sub-minimum window.
    if let Err(report) = config.validate() {
        return Err(EngineError::InvalidInput {
            symbol: series.symbol().to_string(),
            reason: format!("invalid analysis configuration: {report}"),
        });
    }

    let n = series.len();
    let grid = window_grid(n, config).map_err(|(observed, required)| {
        EngineError::InsufficientData {
            symbol: series.symbol().to_string(),
            observed,
            required,
        }
    })?;
    let (window_min, window_max) = (grid[0], grid[grid.len() - 1]);

    let base_seed = config.rng_seed.unwrap_or_else(rand::random);
    tracing::debug!(
        symbol = series.symbol(),
        base_seed,
        windows = grid.len(),
        window_min,
        window_max,
        "starting sweep"
    );

    let aborted = AtomicBool::new(false);
    let rmse_ceiling = config.rmse_ceiling;

    let fit_all = || {
        grid.par_iter()
            .map_init(
                || FitScratch::for_max_window(window_max),
                |scratch, &w| {
                    let (y, start, end) = series.tail_window(w);
                    if cancel.is_cancelled() || Instant::now() >= deadline {
                        aborted.store(true, Ordering::Relaxed);
                        return FitResult::failure(w, start, end);
                    }
                    let seed = derive_seed(base_seed, w);
                    fit_window(y, start, end, rmse_ceiling, seed, scratch)
                },
            )
            .collect::<Vec<FitResult>>()
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_workers())
        .build();
    let fits = match pool {
        Ok(pool) => pool.install(fit_all),
        Err(err) => {
            tracing::warn!(%err, "could not build sweep pool, falling back to global pool");
            fit_all()
        }
    };

    let aborted = aborted.load(Ordering::Relaxed);
    aggregate(series, config, &grid, fits, aborted)
}

fn aggregate(
    series: &PriceSeries,
    config: &AnalysisConfig,
    grid: &[usize],
    fits: Vec<FitResult>,
    aborted: bool,
) -> Result<SweepOutcome, EngineError> {
    let total_windows = fits.len();
    let mut windows = Vec::with_capacity(total_windows);
    let mut successful = Vec::new();
    let mut bubbles = Vec::new();

    for fit in fits {
        let class = classifier::classify(&fit);
        windows.push(WindowSummary {
            window_size: fit.window_size,
            success: fit.success,
            is_bubble: class.is_bubble,
            params: fit.params,
        });
        if fit.success {
            if class.is_bubble {
                bubbles.push(fit.clone());
            }
            successful.push(fit);
        }
    }

    let successful_fits = successful.len();
    let bubble_windows = bubbles.len();

    if aborted && successful_fits < MIN_PARTIAL_FITS {
        return Err(EngineError::AnalysisTimeout {
            symbol: series.symbol().to_string(),
            successful_fits,
        });
    }

    let confidence_indicator = if successful_fits == 0 {
        0.0
    } else {
        100.0 * bubble_windows as f64 / successful_fits as f64
    };
    let success_rate = if total_windows == 0 {
        0.0
    } else {
        100.0 * successful_fits as f64 / total_windows as f64
    };

    let representative = representative_fit(&successful, &bubbles);

    tracing::info!(
        symbol = series.symbol(),
        total_windows,
        successful_fits,
        bubble_windows,
        confidence_indicator,
        aborted,
        "sweep finished"
    );

    Ok(SweepOutcome {
        report: ConfidenceReport {
            total_windows,
            successful_fits,
            bubble_windows,
            success_rate,
            confidence_indicator,
            state: classifier::state_from_confidence_indicator(confidence_indicator),
            timed_out: aborted,
            windows,
        },
        representative,
        window_min: grid[0],
        window_max: grid[grid.len() - 1],
        window_step: config.window_step,
    })
}

/// The fit exposed for charting: the median-window bubble fit when any
/// window classified as a bubble, otherwise the lowest-RMSE successful fit.
fn representative_fit(successful: &[FitResult], bubbles: &[FitResult]) -> Option<FitResult> {
    if !bubbles.is_empty() {
        // `bubbles` arrives in ascending window order.
        return Some(bubbles[bubbles.len() / 2].clone());
    }
    successful
        .iter()
        .min_by_key(|f| OrderedFloat(f.rmse))
        .cloned()
}

/// Mix the sweep seed with the window size (splitmix64 finalizer) so each
/// window draws an independent, reproducible stream even when fitted in
/// parallel.
fn derive_seed(base: u64, window: usize) -> u64 {
    let mut z = base ^ (window as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
