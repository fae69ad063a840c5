//! Feature engineering module
//!
//! Provides technical indicators and fixed-order feature rows for the
//! tree model.

mod engine;
mod indicators;

pub use engine::{FeatureEngine, FeatureRow, N_FEATURES};
pub use indicators::*;
