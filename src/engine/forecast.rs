//! Fitted-curve reconstruction and forward projection.
//!
//! Prices are rebuilt as `exp(ŷ(t))` over the representative window, then
//! extended over business days past the window end. `Δ^m` diverges at the
//! critical time, so the projection stops at `t = ⌊tc⌋ - 1`.

use chrono::NaiveDate;

use crate::data::series::{next_business_day, PriceSeries};
use crate::engine::lppl;
use crate::engine::types::{FitResult, PricePoint};

/// `exp(ŷ(t))` for every observation of the fit's window, paired with the
/// actual observation dates.
pub fn fitted_points(fit: &FitResult, series: &PriceSeries) -> Vec<PricePoint> {
    let Some(params) = fit.params.as_ref() else {
        return Vec::new();
    };
    let w = fit.window_size;
    if w > series.len() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(w);
    for t in 0..w {
        let Some(y) = lppl::predict_at(params, t as f64) else {
            break;
        };
        out.push(PricePoint {
            date: series.window_date(w, t),
            price: y.exp(),
        });
    }
    out
}

/// Up to `forecast_days` business-day projections past the window end,
/// truncated before the critical time.
pub fn forecast_points(
    fit: &FitResult,
    window_end: NaiveDate,
    forecast_days: usize,
) -> Vec<PricePoint> {
    let Some(params) = fit.params.as_ref() else {
        return Vec::new();
    };
    let w = fit.window_size;
    let last_t = (params.tc.floor() as i64 - 1).max(0) as usize;
    let mut out = Vec::with_capacity(forecast_days);
    let mut date = window_end;
    for t in w..w + forecast_days {
        if t > last_t {
            break;
        }
        let Some(y) = lppl::predict_at(params, t as f64) else {
            break;
        };
        date = next_business_day(date);
        out.push(PricePoint {
            date,
            price: y.exp(),
        });
    }
    out
}

/// Calendar estimate of the critical time: `tc - (W-1)` trading days past
/// the window end. `None` for failed fits or a `tc` inside the window.
pub fn critical_date(fit: &FitResult) -> Option<NaiveDate> {
    let params = fit.params.as_ref()?;
    let days_ahead = (params.tc - (fit.window_size as f64 - 1.0)).round();
    if days_ahead < 0.0 {
        return None;
    }
    Some(crate::data::series::add_business_days(
        fit.end_date,
        days_ahead as usize,
    ))
}
