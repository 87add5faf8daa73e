//! Bubble classification rules.
//!
//! A fitted window is a bubble when all four JLS parameter-range tests hold.
//! Single-fit states are noisy; in multi-window mode the state comes from the
//! confidence-indicator bands instead, which aggregate the same four tests
//! across the whole sweep.

use crate::engine::types::{DiagnosisState, FitResult, WindowClassification};

/// Inclusive range of `tc - (n-1)`, in observations ahead of the window end.
pub const TC_DAYS_AHEAD: (f64, f64) = (5.0, 504.0);
pub const M_RANGE: (f64, f64) = (0.1, 0.9);
pub const OMEGA_RANGE: (f64, f64) = (2.0, 25.0);

/// Days-ahead threshold separating CRITICAL from WARNING in single-window mode.
const IMMINENT_DAYS: f64 = 60.0;

/// Apply the four parameter-range tests. A failed fit classifies as nothing.
pub fn classify(fit: &FitResult) -> WindowClassification {
    let Some(params) = fit.params.as_ref() else {
        return WindowClassification::none();
    };
    let days_ahead = params.tc - (fit.window_size as f64 - 1.0);
    let tc_in_range = (TC_DAYS_AHEAD.0..=TC_DAYS_AHEAD.1).contains(&days_ahead);
    let b_negative = params.b < 0.0;
    let m_in_range = (M_RANGE.0..=M_RANGE.1).contains(&params.m);
    let omega_in_range = (OMEGA_RANGE.0..=OMEGA_RANGE.1).contains(&params.omega);
    WindowClassification {
        tc_in_range,
        b_negative,
        m_in_range,
        omega_in_range,
        is_bubble: tc_in_range && b_negative && m_in_range && omega_in_range,
    }
}

/// State of a single fit, used outside the multi-window sweep.
pub fn single_window_state(fit: &FitResult, class: &WindowClassification) -> DiagnosisState {
    let confidence = class.confidence();
    let days_ahead = fit
        .params
        .as_ref()
        .map_or(f64::INFINITY, |p| p.tc - (fit.window_size as f64 - 1.0));
    if class.is_bubble && confidence >= 75.0 {
        if days_ahead <= IMMINENT_DAYS {
            return DiagnosisState::Critical;
        }
        return DiagnosisState::Warning;
    }
    if confidence >= 50.0 {
        return DiagnosisState::Watch;
    }
    DiagnosisState::Normal
}

/// State from the sweep-level confidence indicator (percent).
pub fn state_from_confidence_indicator(ci: f64) -> DiagnosisState {
    if ci >= 60.0 {
        DiagnosisState::Critical
    } else if ci >= 40.0 {
        DiagnosisState::Warning
    } else if ci >= 20.0 {
        DiagnosisState::Watch
    } else {
        DiagnosisState::Normal
    }
}
