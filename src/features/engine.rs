//! Feature engineering engine
//!
//! Derives one fixed-order row of technical features per time step. The
//! tree consumes rows positionally, so [`FeatureEngine::FEATURE_NAMES`]
//! is the single source of truth for the index-to-name binding and must
//! stay in sync with [`FeatureEngine::rows`].

use super::indicators::*;

/// Number of features per row
pub const N_FEATURES: usize = 9;

/// Fixed-width feature row computed at one time step
pub type FeatureRow = [f64; N_FEATURES];

/// Computes fixed-order feature rows from aligned price/volume histories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngine;

impl FeatureEngine {
    /// Feature names in emission order. Index `i` of every row holds the
    /// feature named at index `i` here, across train, validation, test,
    /// and walk-forward forecasting alike.
    pub const FEATURE_NAMES: [&'static str; N_FEATURES] = [
        "price",
        "log_return_1",
        "return_5",
        "return_10",
        "mean_20",
        "std_20",
        "rsi_14",
        "macd_hist",
        "volume_ratio_20",
    ];

    /// Compute one feature row per time step. `prices` and `volumes`
    /// must be aligned; a shorter (or empty) volume history is padded by
    /// the neutral ratio of 1.
    pub fn rows(&self, prices: &[f64], volumes: &[f64]) -> Vec<FeatureRow> {
        let n = prices.len();

        let log_ret = log_return(prices);
        let ret_5 = simple_return(prices, 5);
        let ret_10 = simple_return(prices, 10);
        let mean_20 = rolling_mean(prices, 20);
        let std_20 = rolling_std(prices, 20);
        let rsi_14 = rsi(prices, 14);
        let macd = macd_histogram(prices, 12, 26, 9);
        let vol_ratio = if volumes.len() == n {
            volume_ratio(volumes, 20)
        } else {
            vec![1.0; n]
        };

        (0..n)
            .map(|i| {
                [
                    prices[i],
                    log_ret[i],
                    ret_5[i],
                    ret_10[i],
                    mean_20[i],
                    std_20[i],
                    rsi_14[i],
                    macd[i],
                    vol_ratio[i],
                ]
            })
            .collect()
    }

    /// Supervised dataset for next-step price regression: the row at `i`
    /// paired with the price at `i + 1`.
    pub fn supervised(&self, prices: &[f64], volumes: &[f64]) -> (Vec<FeatureRow>, Vec<f64>) {
        if prices.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let rows = self.rows(prices, volumes);
        let n = rows.len() - 1;

        (rows[..n].to_vec(), prices[1..].to_vec())
    }
}
