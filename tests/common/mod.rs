#![allow(dead_code)]

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use lppl_engine::config::AnalysisConfig;
use lppl_engine::data::PriceSource;
use lppl_engine::engine::lppl;
use lppl_engine::engine::types::LpplParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::{ContinuousCDF, Normal};

/// `n` consecutive business days starting 2022-01-03 (a Monday).
pub fn weekdays(n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut d = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    while out.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        d += chrono::Duration::days(1);
    }
    out
}

/// Gaussian draw via the inverse CDF, driven by the engine's own RNG stack.
fn gaussian(rng: &mut StdRng, normal: &Normal) -> f64 {
    let u: f64 = rng.random_range(f64::EPSILON..1.0);
    normal.inverse_cdf(u)
}

/// The end-to-end bubble fixture: `n` closes generated from known JLS
/// parameters with gaussian log-price noise of the given sigma.
pub fn synthetic_bubble_closes(params: &LpplParams, n: usize, sigma: f64, seed: u64) -> Vec<f64> {
    let y = lppl::predict(params, n).expect("fixture parameters must cover the window");
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, sigma).unwrap();
    y.iter()
        .map(|v| (v + gaussian(&mut rng, &noise)).exp())
        .collect()
}

/// Driftless random walk of cumulative gaussian log-returns.
pub fn random_walk_closes(n: usize, sigma: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let step = Normal::new(0.0, sigma).unwrap();
    let mut log_price = 100.0f64.ln();
    (0..n)
        .map(|_| {
            log_price += gaussian(&mut rng, &step);
            log_price.exp()
        })
        .collect()
}

/// Steady exponential growth: constant daily log-return.
pub fn exponential_growth_closes(n: usize, daily_return: f64) -> Vec<f64> {
    (0..n)
        .map(|t| 100.0 * (daily_return * t as f64).exp())
        .collect()
}

pub fn bubble_params() -> LpplParams {
    LpplParams {
        tc: 430.0,
        m: 0.33,
        omega: 8.5,
        a: 5.0,
        b: -0.25,
        c1: 0.03,
        c2: 0.02,
    }
}

/// In-memory price feed whose history tests can extend day by day.
pub struct StaticPriceSource {
    data: Mutex<(Vec<NaiveDate>, Vec<f64>)>,
}

impl StaticPriceSource {
    pub fn new(dates: Vec<NaiveDate>, closes: Vec<f64>) -> Self {
        Self {
            data: Mutex::new((dates, closes)),
        }
    }

    /// Append one business day after the current last date.
    pub fn push_close(&self, close: f64) {
        let mut data = self.data.lock().unwrap();
        let next = next_weekday(*data.0.last().expect("source must not be empty"));
        data.0.push(next);
        data.1.push(close);
    }
}

fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut d = date + chrono::Duration::days(1);
    while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
        d += chrono::Duration::days(1);
    }
    d
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn daily_closes(
        &self,
        _symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(Vec<NaiveDate>, Vec<f64>)> {
        let data = self.data.lock().unwrap();
        let pairs = data
            .0
            .iter()
            .zip(data.1.iter())
            .filter(|(d, _)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e));
        let (dates, closes): (Vec<_>, Vec<_>) = pairs.map(|(d, c)| (*d, *c)).unzip();
        Ok((dates, closes))
    }
}

/// A feed that always fails, for surfacing upstream I/O errors.
pub struct FailingPriceSource;

#[async_trait]
impl PriceSource for FailingPriceSource {
    async fn daily_closes(
        &self,
        symbol: &str,
        _start: Option<NaiveDate>,
        _end: Option<NaiveDate>,
    ) -> Result<(Vec<NaiveDate>, Vec<f64>)> {
        anyhow::bail!("upstream unavailable for {symbol}")
    }
}

/// A sweep configuration small enough for test runtimes: windows 125..=N
/// with a coarse stride, pinned seed, two workers.
pub fn test_config(window_max: usize, window_step: usize) -> AnalysisConfig {
    AnalysisConfig {
        window_min: 125,
        window_max,
        window_step,
        workers: Some(2),
        rng_seed: Some(20_240_601),
        ..AnalysisConfig::default()
    }
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
