use chrono::{NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fitted JLS parameter set.
///
/// `tc` is expressed in observations from the window start, the same scale as
/// the fit's time axis `t = 0, 1, …, n-1`, so `tc > n - 1` places the
/// critical time in the future.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LpplParams {
    pub tc: f64,
    pub m: f64,
    pub omega: f64,
    pub a: f64,
    pub b: f64,
    pub c1: f64,
    pub c2: f64,
}

impl LpplParams {
    /// Oscillation amplitude `C = sqrt(C1² + C2²)`.
    pub fn c(&self) -> f64 {
        self.c1.hypot(self.c2)
    }

    /// Oscillation phase `φ = atan2(-C2, C1)`.
    pub fn phi(&self) -> f64 {
        (-self.c2).atan2(self.c1)
    }
}

/// Outcome of fitting one trailing window.
///
/// A failed fit carries no parameters and infinite residuals; it is a normal
/// observation for the sweep, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub params: Option<LpplParams>,
    pub ssr: f64,
    pub rmse: f64,
    pub success: bool,
    pub window_size: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl FitResult {
    pub fn failure(window_size: usize, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            params: None,
            ssr: f64::INFINITY,
            rmse: f64::INFINITY,
            success: false,
            window_size,
            start_date,
            end_date,
        }
    }
}

/// The four JLS bubble-range tests over a fitted parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WindowClassification {
    pub tc_in_range: bool,
    pub b_negative: bool,
    pub m_in_range: bool,
    pub omega_in_range: bool,
    pub is_bubble: bool,
}

impl WindowClassification {
    pub fn none() -> Self {
        Self {
            tc_in_range: false,
            b_negative: false,
            m_in_range: false,
            omega_in_range: false,
            is_bubble: false,
        }
    }

    /// Fraction of the four conditions that hold, scaled to [0, 100].
    pub fn confidence(&self) -> f64 {
        let hits = u8::from(self.tc_in_range)
            + u8::from(self.b_negative)
            + u8::from(self.m_in_range)
            + u8::from(self.omega_in_range);
        f64::from(hits) * 25.0
    }
}

/// Diagnosis severity, from the confidence-indicator bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosisState {
    Critical,
    Warning,
    Watch,
    Normal,
}

impl DiagnosisState {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosisState::Critical => "CRITICAL",
            DiagnosisState::Warning => "WARNING",
            DiagnosisState::Watch => "WATCH",
            DiagnosisState::Normal => "NORMAL",
        }
    }
}

/// Per-window entry of the sweep, in ascending window-size order.
///
/// `params` is populated for successful fits so the cache can replay the
/// representative curve; it is omitted from JSON output when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowSummary {
    pub window_size: usize,
    pub success: bool,
    pub is_bubble: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<LpplParams>,
}

/// Aggregate of one multi-window sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfidenceReport {
    pub total_windows: usize,
    pub successful_fits: usize,
    pub bubble_windows: usize,
    /// `100 · successful_fits / total_windows`
    pub success_rate: f64,
    /// `100 · bubble_windows / successful_fits`, 0 when no fit succeeded
    pub confidence_indicator: f64,
    pub state: DiagnosisState,
    pub timed_out: bool,
    pub windows: Vec<WindowSummary>,
}

/// One persisted analysis. Replaced wholesale on refresh; the store retains
/// only the newest entry per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub symbol: String,
    pub analysis_date: NaiveDate,
    pub last_price_date: NaiveDate,
    pub window_min: usize,
    pub window_max: usize,
    pub window_step: usize,
    pub report: ConfidenceReport,
    pub representative: Option<FitResult>,
    pub created_at: NaiveDateTime,
}

// --- Diagnose response types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WindowRange {
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SweepStatistics {
    pub total_windows: usize,
    pub successful_fits: usize,
    pub bubble_windows: usize,
    pub success_rate: f64,
}

/// A dated price level on the fitted or forecast curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// The fit selected for charting, with its reconstructed price curve and
/// forward extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepresentativeFit {
    pub parameters: LpplParams,
    pub fitted_points: Vec<PricePoint>,
    pub forecast_points: Vec<PricePoint>,
}

/// Full payload of one `diagnose` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosisResponse {
    pub symbol: String,
    pub state: DiagnosisState,
    pub confidence_indicator: f64,
    pub analysis_period: AnalysisPeriod,
    pub window_range: WindowRange,
    pub statistics: SweepStatistics,
    pub representative_fit: Option<RepresentativeFit>,
    pub detailed_results: Vec<WindowSummary>,
    pub estimated_critical_date: Option<NaiveDate>,
    pub timed_out: bool,
    pub summary: String,
    pub cached: bool,
    pub cache_persisted: bool,
}
