//! Log-periodic power-law evaluator.
//!
//! The JLS model of a log-price trajectory approaching a critical time `tc`:
//!
//! ```text
//! Δ(t) = tc - t                             (defined only for Δ > 0)
//! ŷ(t) = A + B·Δ^m + C·Δ^m·cos(ω·ln Δ + φ)
//! ```
//!
//! Internally the oscillation is carried in linearized form,
//! `ŷ = A + B·f + C1·h + C2·k` with `f = Δ^m`, `h = Δ^m·cos(ω ln Δ)`,
//! `k = Δ^m·sin(ω ln Δ)`, which is linear in `(A, B, C1, C2)` for fixed
//! `(tc, m, ω)`. Domain violations (`Δ ≤ 0`, non-finite intermediates) are
//! trapped here so they surface as infinite residuals, never as NaN.

use crate::engine::types::LpplParams;

/// Model prediction at a single day offset. `None` when `t` is at or past
/// the critical time or the evaluation overflows.
pub fn predict_at(params: &LpplParams, t: f64) -> Option<f64> {
    let dt = params.tc - t;
    if dt <= 0.0 {
        return None;
    }
    let pow = dt.powf(params.m);
    let angle = params.omega * dt.ln();
    let y = params.a + params.b * pow + pow * (params.c1 * angle.cos() + params.c2 * angle.sin());
    y.is_finite().then_some(y)
}

/// Predicted log-prices for `t = 0, 1, …, n-1`. `None` if any point is
/// outside the model domain.
pub fn predict(params: &LpplParams, n: usize) -> Option<Vec<f64>> {
    let mut out = Vec::with_capacity(n);
    for t in 0..n {
        out.push(predict_at(params, t as f64)?);
    }
    Some(out)
}

/// Sum of squared residuals against an observed log-price window.
/// Infinite when the parameter set leaves the model domain anywhere on the
/// window, so optimizers reject the point.
pub fn ssr(params: &LpplParams, y: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (t, &obs) in y.iter().enumerate() {
        let Some(pred) = predict_at(params, t as f64) else {
            return f64::INFINITY;
        };
        let r = obs - pred;
        acc += r * r;
    }
    if acc.is_finite() {
        acc
    } else {
        f64::INFINITY
    }
}

/// Fill the linearized basis columns `f = Δ^m`, `h = Δ^m·cos(ω ln Δ)` and
/// `k = Δ^m·sin(ω ln Δ)` for `t = 0, 1, …, n-1`.
///
/// Returns `false` (leaving the buffers unspecified) when the candidate
/// `(tc, m, ω)` leaves the domain or overflows on the window.
pub fn assemble_basis(
    tc: f64,
    m: f64,
    omega: f64,
    n: usize,
    f: &mut [f64],
    h: &mut [f64],
    k: &mut [f64],
) -> bool {
    debug_assert!(f.len() >= n && h.len() >= n && k.len() >= n);
    for t in 0..n {
        let dt = tc - t as f64;
        if dt <= 0.0 {
            return false;
        }
        let pow = dt.powf(m);
        if !pow.is_finite() {
            return false;
        }
        let angle = omega * dt.ln();
        f[t] = pow;
        h[t] = pow * angle.cos();
        k[t] = pow * angle.sin();
    }
    true
}
