use std::fmt;

use thiserror::Error;

/// Pipeline stage a surfaced error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Fit,
    Aggregate,
    Cache,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Preprocess => "preprocess",
            Stage::Fit => "fit",
            Stage::Aggregate => "aggregate",
            Stage::Cache => "cache",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the diagnosis facade.
///
/// Per-window optimizer misfits are not represented here: a window that the
/// model does not describe is recorded as `success = false` in the sweep and
/// feeds the confidence indicator like any other observation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{symbol}: {observed} observations, need at least {required} [stage: preprocess]")]
    InsufficientData {
        symbol: String,
        observed: usize,
        required: usize,
    },

    #[error("{symbol}: {reason} [stage: preprocess]")]
    InvalidInput { symbol: String, reason: String },

    #[error("{symbol}: sweep deadline hit with only {successful_fits} successful fits [stage: fit]")]
    AnalysisTimeout {
        symbol: String,
        successful_fits: usize,
    },

    #[error("{symbol}: price source failed: {source} [stage: preprocess]")]
    PriceSource {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{symbol}: cache write failed: {source} [stage: cache]")]
    CachePersist {
        symbol: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    pub fn symbol(&self) -> &str {
        match self {
            EngineError::InsufficientData { symbol, .. }
            | EngineError::InvalidInput { symbol, .. }
            | EngineError::AnalysisTimeout { symbol, .. }
            | EngineError::PriceSource { symbol, .. }
            | EngineError::CachePersist { symbol, .. } => symbol,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            EngineError::InsufficientData { .. }
            | EngineError::InvalidInput { .. }
            | EngineError::PriceSource { .. } => Stage::Preprocess,
            EngineError::AnalysisTimeout { .. } => Stage::Fit,
            EngineError::CachePersist { .. } => Stage::Cache,
        }
    }
}
