//! Single-window JLS fitter.
//!
//! The seven-parameter sum-of-squares surface is linear in `(A, C1, C2)`
//! once `(tc, m, ω, B)` are fixed, so the bounded global search runs in four
//! dimensions: a differential-evolution loop proposes candidates and each one
//! is completed by an analytic least-squares solve of the remaining linear
//! subproblem. `B` stays a search dimension rather than joining the linear
//! solve: its upper bound is the sign constraint that identifies the bubble
//! branch, and windows that want a non-negative power-law load must converge
//! onto that boundary, where the strict `B < 0` classification test can see
//! them. Candidates whose linear solution leaves the `(A, C1, C2)` box are
//! penalized so the search settles on feasible interiors.
//!
//! A window the model does not describe produces `success = false`. That is
//! the expected outcome for a large share of sweep windows and is consumed as
//! signal by the confidence indicator.

use chrono::NaiveDate;
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::lppl;
use crate::engine::types::{FitResult, LpplParams};

/// Search-space bounds on a window of `n` observations: critical time between
/// 5 days and two trading-years ahead, power exponent and log-frequency in
/// the empirical JLS bands, power-law load sign-constrained.
#[derive(Debug, Clone, Copy)]
pub struct FitBounds {
    pub tc: (f64, f64),
    pub m: (f64, f64),
    pub omega: (f64, f64),
    pub b: (f64, f64),
}

impl FitBounds {
    pub fn for_window(n: usize) -> Self {
        let n = n as f64;
        Self {
            tc: (n + 5.0, n + 504.0),
            m: (0.1, 0.9),
            omega: (2.0, 25.0),
            b: (B_MIN, B_MAX),
        }
    }

    fn low(&self, dim: usize) -> f64 {
        [self.tc.0, self.m.0, self.omega.0, self.b.0][dim]
    }

    fn high(&self, dim: usize) -> f64 {
        [self.tc.1, self.m.1, self.omega.1, self.b.1][dim]
    }
}

pub const B_MIN: f64 = -2.0;
pub const B_MAX: f64 = 0.0;
/// Box constraint on the oscillation amplitudes `C1`, `C2`.
pub const C_MIN: f64 = -1.0;
pub const C_MAX: f64 = 1.0;

const DIMS: usize = 4;
const POPULATION: usize = 30;
const MAX_GENERATIONS: usize = 200;
const DIFFERENTIAL_WEIGHT: f64 = 0.8;
const CROSSOVER_RATE: f64 = 0.9;
const RELATIVE_TOLERANCE: f64 = 1e-6;
/// Candidates whose SSR agree within this relative band are tied; the one
/// with the nearer critical time wins.
const TIE_TOLERANCE: f64 = 1e-9;
/// Added to the objective when the linear solve leaves the parameter box.
/// Dominates any plausible log-price SSR, and grows with the violation so the
/// search is still steered back toward the box.
const INFEASIBLE_PENALTY: f64 = 1e6;

/// Per-worker scratch space, sized once for the largest window of a sweep so
/// the fit loop does no per-candidate allocation.
pub struct FitScratch {
    f: Vec<f64>,
    h: Vec<f64>,
    k: Vec<f64>,
}

impl FitScratch {
    pub fn for_max_window(max_window: usize) -> Self {
        Self {
            f: vec![0.0; max_window],
            h: vec![0.0; max_window],
            k: vec![0.0; max_window],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// `(tc, m, ω, B)`
    x: [f64; DIMS],
    /// Penalized objective the evolution loop minimizes.
    cost: f64,
    /// Raw sum of squared residuals of the completed 7-parameter point.
    ssr: f64,
    /// `(A, C1, C2)` from the linear subproblem.
    linear: [f64; 3],
    feasible: bool,
}

/// Fit one log-price window. Deterministic for a given `(y, seed)` pair.
pub fn fit_window(
    y: &[f64],
    start_date: NaiveDate,
    end_date: NaiveDate,
    rmse_ceiling: f64,
    seed: u64,
    scratch: &mut FitScratch,
) -> FitResult {
    let n = y.len();
    let bounds = FitBounds::for_window(n);
    let (y_min, y_max) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let a_bounds = (y_min - 1.0, y_max + 1.0);

    let mut rng = StdRng::seed_from_u64(seed);

    let mut population: Vec<Candidate> = (0..POPULATION)
        .map(|_| {
            let mut x = [0.0; DIMS];
            for (d, slot) in x.iter_mut().enumerate() {
                *slot = uniform(&mut rng, bounds.low(d), bounds.high(d));
            }
            evaluate(x, y, a_bounds, scratch)
        })
        .collect();

    let mut best = champion(&population, n as f64);

    for _generation in 0..MAX_GENERATIONS {
        if converged(&population) {
            break;
        }
        for i in 0..POPULATION {
            let [r1, r2, r3] = pick_distinct(&mut rng, i);
            let j_rand = rng.random_range(0..DIMS);
            let mut x = population[i].x;
            for (d, slot) in x.iter_mut().enumerate() {
                if d == j_rand || rng.random::<f64>() < CROSSOVER_RATE {
                    let mutant = population[r1].x[d]
                        + DIFFERENTIAL_WEIGHT * (population[r2].x[d] - population[r3].x[d]);
                    *slot = mutant.clamp(bounds.low(d), bounds.high(d));
                }
            }
            let trial = evaluate(x, y, a_bounds, scratch);
            if trial.cost <= population[i].cost {
                population[i] = trial;
            }
        }
        let contender = champion(&population, n as f64);
        if prefer(&contender, &best, n as f64) {
            best = contender;
        }
    }

    if !best.feasible || !best.ssr.is_finite() {
        return FitResult::failure(n, start_date, end_date);
    }
    let rmse = (best.ssr / n as f64).sqrt();
    if rmse > rmse_ceiling {
        return FitResult::failure(n, start_date, end_date);
    }

    FitResult {
        params: Some(LpplParams {
            tc: best.x[0],
            m: best.x[1],
            omega: best.x[2],
            a: best.linear[0],
            b: best.x[3],
            c1: best.linear[1],
            c2: best.linear[2],
        }),
        ssr: best.ssr,
        rmse,
        success: true,
        window_size: n,
        start_date,
        end_date,
    }
}

fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    lo + rng.random::<f64>() * (hi - lo)
}

fn pick_distinct(rng: &mut StdRng, exclude: usize) -> [usize; 3] {
    let mut out = [0usize; 3];
    let mut filled = 0;
    while filled < 3 {
        let c = rng.random_range(0..POPULATION);
        if c != exclude && !out[..filled].contains(&c) {
            out[filled] = c;
            filled += 1;
        }
    }
    out
}

/// Complete a `(tc, m, ω, B)` candidate: solve the `(A, C1, C2)` subproblem
/// via the 3×3 normal equations and score the full point.
fn evaluate(
    x: [f64; DIMS],
    y: &[f64],
    a_bounds: (f64, f64),
    scratch: &mut FitScratch,
) -> Candidate {
    let n = y.len();
    let infeasible = Candidate {
        x,
        cost: f64::INFINITY,
        ssr: f64::INFINITY,
        linear: [0.0; 3],
        feasible: false,
    };

    if !lppl::assemble_basis(
        x[0],
        x[1],
        x[2],
        n,
        &mut scratch.f,
        &mut scratch.h,
        &mut scratch.k,
    ) {
        return infeasible;
    }

    let b = x[3];
    let mut ata = Matrix3::<f64>::zeros();
    let mut aty = Vector3::<f64>::zeros();
    for t in 0..n {
        let g = Vector3::new(1.0, scratch.h[t], scratch.k[t]);
        let target = y[t] - b * scratch.f[t];
        ata += g * g.transpose();
        aty += g * target;
    }
    let Some(beta) = ata.lu().solve(&aty) else {
        return infeasible;
    };
    let (a, c1, c2) = (beta[0], beta[1], beta[2]);

    let mut ssr = 0.0;
    for t in 0..n {
        let pred = a + b * scratch.f[t] + c1 * scratch.h[t] + c2 * scratch.k[t];
        let r = y[t] - pred;
        ssr += r * r;
    }
    if !ssr.is_finite() {
        return infeasible;
    }

    let violation = box_violation(a, a_bounds.0, a_bounds.1)
        + box_violation(c1, C_MIN, C_MAX)
        + box_violation(c2, C_MIN, C_MAX);
    let feasible = violation == 0.0;
    let cost = if feasible {
        ssr
    } else {
        ssr + INFEASIBLE_PENALTY * (1.0 + violation)
    };

    Candidate {
        x,
        cost,
        ssr,
        linear: [a, c1, c2],
        feasible,
    }
}

fn box_violation(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo - v
    } else if v > hi {
        v - hi
    } else {
        0.0
    }
}

/// True when `cand` should displace `incumbent`: lower cost, or an SSR tie
/// broken toward the nearer critical time.
fn prefer(cand: &Candidate, incumbent: &Candidate, n: f64) -> bool {
    if !cand.cost.is_finite() {
        return false;
    }
    if !incumbent.cost.is_finite() {
        return true;
    }
    if cand.feasible == incumbent.feasible {
        let tie = (cand.ssr - incumbent.ssr).abs()
            <= TIE_TOLERANCE * incumbent.ssr.max(f64::MIN_POSITIVE);
        if tie {
            return (cand.x[0] - n).abs() < (incumbent.x[0] - n).abs();
        }
    }
    cand.cost < incumbent.cost
}

fn champion(population: &[Candidate], n: f64) -> Candidate {
    let mut best = population[0];
    for cand in &population[1..] {
        if prefer(cand, &best, n) {
            best = *cand;
        }
    }
    best
}

fn converged(population: &[Candidate]) -> bool {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for c in population {
        if !c.cost.is_finite() {
            return false;
        }
        lo = lo.min(c.cost);
        hi = hi.max(c.cost);
    }
    hi - lo <= RELATIVE_TOLERANCE * lo.abs().max(1e-12)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lppl::predict;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset)
    }

    fn synthetic(params: &LpplParams, n: usize) -> Vec<f64> {
        predict(params, n).unwrap()
    }

    fn bubble_params() -> LpplParams {
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

    #[test]
    fn recovers_known_parameters_on_clean_series() {
        let truth = bubble_params();
        let y = synthetic(&truth, 400);
        let mut scratch = FitScratch::for_max_window(400);
        let fit = fit_window(&y, day(0), day(399), 0.5, 7, &mut scratch);
        assert!(fit.success, "fit failed on noiseless model data");
        let p = fit.params.unwrap();
        assert!(
            (p.tc - truth.tc).abs() / truth.tc < 0.05,
            "tc = {} vs {}",
            p.tc,
            truth.tc
        );
        assert!((p.m - truth.m).abs() < 0.1, "m = {}", p.m);
        assert!(
            (p.omega - truth.omega).abs() / truth.omega < 0.1,
            "omega = {}",
            p.omega
        );
        assert!((p.a - truth.a).abs() / truth.a.abs() < 0.1, "a = {}", p.a);
        assert!((p.b - truth.b).abs() / truth.b.abs() < 0.3, "b = {}", p.b);
        assert!(fit.rmse < 0.01, "rmse = {}", fit.rmse);
    }

    #[test]
    fn successful_fit_respects_all_bounds() {
        let truth = bubble_params();
        let y = synthetic(&truth, 400);
        let mut scratch = FitScratch::for_max_window(400);
        let fit = fit_window(&y, day(0), day(399), 0.5, 11, &mut scratch);
        assert!(fit.success);
        let p = fit.params.unwrap();
        let n = fit.window_size as f64;
        assert!(p.tc >= n + 5.0 && p.tc <= n + 504.0);
        assert!((0.1..=0.9).contains(&p.m));
        assert!((2.0..=25.0).contains(&p.omega));
        assert!((B_MIN..=B_MAX).contains(&p.b));
        assert!((C_MIN..=C_MAX).contains(&p.c1));
        assert!((C_MIN..=C_MAX).contains(&p.c2));
    }

    #[test]
    fn same_seed_same_fit() {
        let y = synthetic(&bubble_params(), 300);
        let mut s1 = FitScratch::for_max_window(300);
        let mut s2 = FitScratch::for_max_window(300);
        let a = fit_window(&y, day(0), day(299), 0.5, 99, &mut s1);
        let b = fit_window(&y, day(0), day(299), 0.5, 99, &mut s2);
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_rmse_ceiling_forces_failure() {
        let y = synthetic(&bubble_params(), 200);
        // Perturb so the residual cannot be ~0.
        let y: Vec<f64> = y
            .iter()
            .enumerate()
            .map(|(i, v)| v + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        let mut scratch = FitScratch::for_max_window(200);
        let fit = fit_window(&y, day(0), day(199), 1e-9, 5, &mut scratch);
        assert!(!fit.success);
        assert!(fit.params.is_none());
    }

    #[test]
    fn bounds_table_matches_window_length() {
        let b = FitBounds::for_window(125);
        assert!((b.tc.0 - 130.0).abs() < f64::EPSILON);
        assert!((b.tc.1 - 629.0).abs() < f64::EPSILON);
        assert!((b.m.0 - 0.1).abs() < f64::EPSILON);
        assert!((b.omega.1 - 25.0).abs() < f64::EPSILON);
        assert!((b.b.0 - B_MIN).abs() < f64::EPSILON);
        assert!((b.b.1 - B_MAX).abs() < f64::EPSILON);
    }

    #[test]
    fn declining_series_converges_onto_the_sign_boundary() {
        // A falling log-price wants a positive power-law load; the search
        // must press B against its upper bound instead.
        let y: Vec<f64> = (0..200).map(|t| 5.0 - 0.002 * f64::from(t)).collect();
        let mut scratch = FitScratch::for_max_window(200);
        let fit = fit_window(&y, day(0), day(199), 0.5, 21, &mut scratch);
        if fit.success {
            let p = fit.params.unwrap();
            assert!(p.b >= B_MIN && p.b <= B_MAX);
        }
    }

    #[test]
    fn failure_is_not_an_error_on_random_noise() {
        // A pure noise window either fails or fits with a non-bubble shape;
        // it must never panic.
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
        };
        let y: Vec<f64> = (0..150).map(|_| 4.6 + 0.2 * next()).collect();
        let mut scratch = FitScratch::for_max_window(150);
        let _ = fit_window(&y, day(0), day(149), 0.5, 3, &mut scratch);
    }
}
