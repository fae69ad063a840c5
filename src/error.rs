//! Error types for the forecasting library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Series too short for the requested lookback/horizon
    #[error("insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Ensemble blend requested with zero forecasts
    #[error("ensemble requires at least one model forecast")]
    EmptyEnsemble,

    /// Run aborted through the cancellation token
    #[error("run cancelled")]
    Cancelled,

    /// A model failed during training or forecasting
    #[error("model error: {0}")]
    Model(String),

    /// CSV parsing error (demo binary input)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
