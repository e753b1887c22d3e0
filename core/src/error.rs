use thiserror::Error;

/// Caller configuration mistakes in a single simulation request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("numSims must be a positive integer, got {0}")]
    ZeroSimulations(usize),

    #[error("No center value supplied for variable '{key}'")]
    MissingCenter { key: String },

    #[error("No bounds supplied for variable '{key}'")]
    MissingBounds { key: String },

    #[error("Bounds for '{key}' are inverted: min {min} > max {max}")]
    InvertedBounds { key: String, min: f64, max: f64 },

    #[error("Center {center} for '{key}' lies outside bounds [{min}, {max}]")]
    CenterOutOfBounds { key: String, center: f64, min: f64, max: f64 },

    #[error("fiscalWeight must lie in [0, 1], got {0}")]
    FiscalWeightOutOfRange(f64),

    #[error("Input '{field}' must be finite, got {value}")]
    NonFinite { field: String, value: f64 },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ParameterError),

    #[error("Invalid calibration: {reason}")]
    InvalidCalibration { reason: String },

    #[error("Correlation matrix is not positive semi-definite: pivot {index} residual {residual:.6}")]
    IllConditionedCorrelation { index: usize, residual: f64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Simulation cancelled before any draw completed")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn calibration(reason: impl Into<String>) -> Self {
        Self::InvalidCalibration { reason: reason.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
