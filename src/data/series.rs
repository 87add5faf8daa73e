//! Price preprocessing.
//!
//! A validated daily close series with its log-price vector. Time is carried
//! as index-based day offsets `t = 0, 1, …, N-1`: calendar gaps between
//! business days are ignored, which is the convention the fitter assumes, so
//! `tc` is measured in observations from the window start rather than
//! calendar days.

use chrono::{Datelike, NaiveDate, Weekday};

use crate::error::EngineError;

/// Minimum number of observations the engine will analyze.
pub const MIN_OBSERVATIONS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    dates: Vec<NaiveDate>,
    closes: Vec<f64>,
    log_closes: Vec<f64>,
}

impl PriceSeries {
    /// Validate and normalize a raw close series.
    ///
    /// Leading and trailing non-finite closes are stripped; after stripping,
    /// the series must have at least [`MIN_OBSERVATIONS`] points, strictly
    /// positive finite closes, and strictly increasing dates.
    pub fn new(
        symbol: impl Into<String>,
        mut dates: Vec<NaiveDate>,
        mut closes: Vec<f64>,
    ) -> Result<Self, EngineError> {
        let symbol = symbol.into();
        if dates.len() != closes.len() {
            return Err(EngineError::InvalidInput {
                symbol,
                reason: format!(
                    "date/close length mismatch ({} vs {})",
                    dates.len(),
                    closes.len()
                ),
            });
        }

        let lead = closes.iter().take_while(|v| !v.is_finite()).count();
        let trail = closes
            .iter()
            .rev()
            .take_while(|v| !v.is_finite())
            .count()
            .min(closes.len() - lead);
        closes.drain(closes.len() - trail..);
        closes.drain(..lead);
        dates.drain(dates.len() - trail..);
        dates.drain(..lead);

        if closes.len() < MIN_OBSERVATIONS {
            return Err(EngineError::InsufficientData {
                symbol,
                observed: closes.len(),
                required: MIN_OBSERVATIONS,
            });
        }
        if let Some(bad) = closes.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(EngineError::InvalidInput {
                symbol,
                reason: format!("non-positive or non-finite close: {bad}"),
            });
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidInput {
                symbol,
                reason: format!("dates not strictly increasing at {}", w[1]),
            });
        }

        let log_closes = closes.iter().map(|c| c.ln()).collect();
        Ok(Self {
            symbol,
            dates,
            closes,
            log_closes,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn log_closes(&self) -> &[f64] {
        &self.log_closes
    }

    pub fn first_date(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last_date(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// The trailing `window` log-closes with their calendar span.
    /// Panics if `window` exceeds the series length; sweep grids are clamped
    /// before this is reached.
    pub fn tail_window(&self, window: usize) -> (&[f64], NaiveDate, NaiveDate) {
        let n = self.len();
        assert!(window >= 1 && window <= n, "window {window} out of range");
        let start = n - window;
        (&self.log_closes[start..], self.dates[start], self.last_date())
    }

    /// Date of the observation at day-offset `t` within the trailing window
    /// of size `window`.
    pub fn window_date(&self, window: usize, t: usize) -> NaiveDate {
        self.dates[self.len() - window + t]
    }
}

/// The next business day (Mon–Fri) strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut d = date + chrono::Duration::days(1);
    while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
        d += chrono::Duration::days(1);
    }
    d
}

/// Advance `days` business days past `date` (0 returns `date` unchanged).
pub fn add_business_days(date: NaiveDate, days: usize) -> NaiveDate {
    let mut d = date;
    for _ in 0..days {
        d = next_business_day(d);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn weekdays(from: NaiveDate, n: usize) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(n);
        let mut d = from;
        while out.len() < n {
            if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
                out.push(d);
            }
            d += chrono::Duration::days(1);
        }
        out
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn accepts_minimal_series() {
        let dates = weekdays(start(), 30);
        let closes = vec![100.0; 30];
        let s = PriceSeries::new("SPY", dates, closes).unwrap();
        assert_eq!(s.len(), 30);
        assert!((s.log_closes()[0] - 100.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn rejects_29_observations() {
        let dates = weekdays(start(), 29);
        let err = PriceSeries::new("SPY", dates, vec![100.0; 29]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData { observed: 29, .. }
        ));
    }

    #[test]
    fn rejects_non_positive_close() {
        let dates = weekdays(start(), 30);
        let mut closes = vec![100.0; 30];
        closes[10] = 0.0;
        let err = PriceSeries::new("SPY", dates, closes).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn rejects_non_monotonic_dates() {
        let mut dates = weekdays(start(), 30);
        dates.swap(5, 6);
        let err = PriceSeries::new("SPY", dates, vec![100.0; 30]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn strips_leading_and_trailing_nans() {
        let dates = weekdays(start(), 34);
        let mut closes = vec![100.0; 34];
        closes[0] = f64::NAN;
        closes[1] = f64::NAN;
        closes[33] = f64::NAN;
        let s = PriceSeries::new("SPY", dates.clone(), closes).unwrap();
        assert_eq!(s.len(), 31);
        assert_eq!(s.first_date(), dates[2]);
        assert_eq!(s.last_date(), dates[32]);
    }

    #[test]
    fn interior_nan_is_invalid() {
        let dates = weekdays(start(), 32);
        let mut closes = vec![100.0; 32];
        closes[15] = f64::NAN;
        let err = PriceSeries::new("SPY", dates, closes).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
    }

    #[test]
    fn tail_window_spans_the_right_dates() {
        let dates = weekdays(start(), 40);
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + f64::from(i)).collect();
        let s = PriceSeries::new("SPY", dates.clone(), closes).unwrap();
        let (y, win_start, win_end) = s.tail_window(10);
        assert_eq!(y.len(), 10);
        assert_eq!(win_start, dates[30]);
        assert_eq!(win_end, dates[39]);
        assert!((y[0] - 130.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn next_business_day_skips_weekend() {
        // 2024-01-05 is a Friday.
        let fri = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(
            next_business_day(fri),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
        );
    }

    #[test]
    fn add_business_days_counts_trading_days() {
        let fri = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(add_business_days(fri, 0), fri);
        assert_eq!(
            add_business_days(fri, 5),
            NaiveDate::from_ymd_opt(2024, 1, 12).unwrap()
        );
    }
}
