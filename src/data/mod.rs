//! Data structures and preprocessing module
//!
//! Provides the daily price series type plus the split/scale/window
//! layer shared by all models.

mod preprocess;
mod series;

pub use preprocess::{build_sequences, split, Scaler, Split};
pub use series::{Bar, PriceSeries};
