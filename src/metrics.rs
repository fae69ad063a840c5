//! Point-forecast accuracy metrics
//!
//! All three models report the same MAE/RMSE/MAPE triple against their
//! held-out test predictions, so cross-model comparisons stay
//! apples-to-apples.

use serde::{Deserialize, Serialize};

/// Guards the MAPE denominator when an actual value is zero.
const MAPE_EPS: f64 = 1e-10;

/// Accuracy triple for a set of point predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

impl Metrics {
    /// Compute all three metrics over paired actual/predicted slices.
    ///
    /// Empty input yields all-zero metrics rather than NaN.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return Self {
                mae: 0.0,
                rmse: 0.0,
                mape: 0.0,
            };
        }

        Self {
            mae: mae(&actual[..n], &predicted[..n]),
            rmse: rmse(&actual[..n], &predicted[..n]),
            mape: mape(&actual[..n], &predicted[..n]),
        }
    }
}

/// Mean Absolute Error
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n
}

/// Root Mean Squared Error
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    (actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}

/// Mean Absolute Percentage Error, in percent
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| (a - p).abs() / (a.abs() + MAPE_EPS))
        .sum::<f64>()
        / n
        * 100.0
}
