//! # Forecast ML - Multi-Model Price Forecasting
//!
//! This library forecasts a daily price series 30 steps ahead by
//! training three independent regressors and blending their outputs:
//!
//! - a from-scratch CART regression tree with hyperparameter grid search
//! - a Geometric Brownian Motion Monte Carlo simulator with seeded,
//!   fully reproducible paths
//! - a sequence-regressor training loop (early stopping, walk-forward
//!   forecasting) around an externally supplied model primitive
//!
//! ## Modules
//!
//! - `data` - price series, chronological splitting, scaling, windows
//! - `features` - technical-indicator feature rows for the tree
//! - `models` - the three regressors and the ensemble blender
//! - `metrics` - shared MAE/RMSE/MAPE evaluation
//! - `pipeline` - sequential orchestration with progress and cancellation

pub mod cancel;
pub mod data;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use metrics::Metrics;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::data::{build_sequences, split, Bar, PriceSeries, Scaler};
    pub use crate::error::{Error, Result};
    pub use crate::features::FeatureEngine;
    pub use crate::metrics::Metrics;
    pub use crate::models::{
        blend, Band, EnsembleForecast, GbmConfig, GbmModel, GbmParams, LinearWindowModel,
        ModelForecast, SequenceModel, TrainerConfig, TreeModel, TreeParams, TreeSearchConfig,
    };
    pub use crate::pipeline::{run, PipelineConfig, ProgressObserver, RunReport, TracingProgress};
}
