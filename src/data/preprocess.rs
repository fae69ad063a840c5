//! Time-ordered splitting, min-max scaling, and supervised window construction
//!
//! Everything here is pure given its inputs. The scaler is fit on the
//! training segment only; validation and test data never leak into it.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Three contiguous chronological segments of a series
#[derive(Debug, Clone, PartialEq)]
pub struct Split<'a, T> {
    pub train: &'a [T],
    pub val: &'a [T],
    pub test: &'a [T],
}

/// Deterministic chronological split at `floor(n * train_frac)` and
/// `floor(n * (train_frac + val_frac))`; the remainder is the test segment.
///
/// Segment lengths always sum to the input length. Returns
/// `InsufficientData` when any segment comes out empty.
pub fn split<T>(data: &[T], train_frac: f64, val_frac: f64) -> Result<Split<'_, T>> {
    let n = data.len();
    let train_end = (n as f64 * train_frac).floor() as usize;
    let val_end = (n as f64 * (train_frac + val_frac)).floor() as usize;

    if train_end == 0 || val_end <= train_end || val_end >= n {
        return Err(Error::InsufficientData {
            needed: 3,
            got: n,
        });
    }

    Ok(Split {
        train: &data[..train_end],
        val: &data[train_end..val_end],
        test: &data[val_end..],
    })
}

/// Immutable min-max scaler fit once on training data.
///
/// `transform` and `inverse` are exact mathematical inverses when
/// `range > 0`. A constant input series gets `range = 1`, so transform
/// emits zeros and inverse still round-trips to the constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub min: f64,
    pub max: f64,
    pub range: f64,
}

impl Scaler {
    /// Fit min/max over the input. Empty input fits a degenerate
    /// zero/one scaler.
    pub fn fit(data: &[f64]) -> Self {
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if !min.is_finite() || !max.is_finite() {
            return Self {
                min: 0.0,
                max: 0.0,
                range: 1.0,
            };
        }

        let range = if max - min > 0.0 { max - min } else { 1.0 };
        Self { min, max, range }
    }

    pub fn transform_one(&self, x: f64) -> f64 {
        (x - self.min) / self.range
    }

    pub fn inverse_one(&self, x: f64) -> f64 {
        x * self.range + self.min
    }

    pub fn transform(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&x| self.transform_one(x)).collect()
    }

    pub fn inverse(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&x| self.inverse_one(x)).collect()
    }
}

/// Build supervised sliding windows: for every index `i` in `[lookback, n)`
/// one input row `scaled[i-lookback..i]` and one target `scaled[i]`.
///
/// Returns `InsufficientData` when fewer than one window fits.
pub fn build_sequences(scaled: &[f64], lookback: usize) -> Result<(Array2<f64>, Array1<f64>)> {
    let n = scaled.len();
    if n <= lookback {
        return Err(Error::InsufficientData {
            needed: lookback + 1,
            got: n,
        });
    }

    let n_windows = n - lookback;
    let mut x = Array2::zeros((n_windows, lookback));
    let mut y = Array1::zeros(n_windows);

    for i in 0..n_windows {
        for t in 0..lookback {
            x[[i, t]] = scaled[i + t];
        }
        y[i] = scaled[i + lookback];
    }

    Ok((x, y))
}
