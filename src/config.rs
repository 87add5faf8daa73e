use anyhow::Context;
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_window_min() -> usize {
    125
}

fn default_window_max() -> usize {
    750
}

fn default_window_step() -> usize {
    5
}

fn default_forecast_days() -> usize {
    60
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_rmse_ceiling() -> f64 {
    0.5
}

fn validate_window_max_gte_min(min: &usize) -> impl FnOnce(&usize, &()) -> garde::Result + '_ {
    move |max: &usize, (): &()| {
        if max < min {
            return Err(garde::Error::new(format!(
                "window_max ({max}) must be >= window_min ({min})"
            )));
        }
        Ok(())
    }
}

/// Knobs recognized by the diagnosis engine. All fields default to the
/// published sweep settings, so `AnalysisConfig::default()` is a working
/// configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Smallest sweep window, in observations (default: 125)
    #[serde(default = "default_window_min")]
    #[garde(range(min = 30))]
    pub window_min: usize,
    /// Largest sweep window, in observations (default: 750)
    #[serde(default = "default_window_max")]
    #[garde(custom(validate_window_max_gte_min(&self.window_min)))]
    pub window_max: usize,
    /// Stride between window sizes (default: 5)
    #[serde(default = "default_window_step")]
    #[garde(range(min = 1))]
    pub window_step: usize,
    /// Business days projected past the window end (default: 60)
    #[serde(default = "default_forecast_days")]
    #[garde(skip)]
    pub forecast_days: usize,
    /// Wall-clock ceiling for one sweep (default: 60)
    #[serde(default = "default_timeout_seconds")]
    #[garde(range(min = 1))]
    pub timeout_seconds: u64,
    /// Fit-parallelism; `min(cores, 8)` when unset
    #[serde(default)]
    #[garde(inner(range(min = 1)))]
    pub workers: Option<usize>,
    /// Optimizer seed; runs are deterministic per (window, seed) when set
    #[serde(default)]
    #[garde(skip)]
    pub rng_seed: Option<u64>,
    /// Fits with log-price RMSE above this ceiling are rejected (default: 0.5)
    #[serde(default = "default_rmse_ceiling")]
    #[garde(range(min = 1e-6))]
    pub rmse_ceiling: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_min: default_window_min(),
            window_max: default_window_max(),
            window_step: default_window_step(),
            forecast_days: default_forecast_days(),
            timeout_seconds: default_timeout_seconds(),
            workers: None,
            rng_seed: None,
            rmse_ceiling: default_rmse_ceiling(),
        }
    }
}

impl AnalysisConfig {
    /// Resolved worker count: the configured value, else `min(cores, 8)`.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map_or(1, usize::from)
                .min(8)
        })
    }

    /// Load and validate a flat TOML config file.
    pub fn from_toml_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }
}
