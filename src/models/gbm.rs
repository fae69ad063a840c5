//! Geometric Brownian Motion Monte Carlo simulator
//!
//! Fits annualized drift and volatility from historical log returns,
//! then simulates forward price paths from a seeded ChaCha8 stream.
//! Central and band forecasts are order statistics across paths, so
//! identical `(params, horizon, n_paths, seed)` always reproduce the
//! same output bit for bit.

use crate::data::split;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trading days per year used for annualization
const TRADING_DAYS: f64 = 252.0;

/// Fitted GBM parameters. `mu`/`sigma` are annualized; `last_price` is
/// the simulation anchor and can be rebound per call without refitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    pub mu: f64,
    pub sigma: f64,
    pub last_price: f64,
}

impl GbmParams {
    /// Fit drift and volatility from a price history's daily log
    /// returns: `mu = mean * 252`, `sigma = std * sqrt(252)`
    /// (population std).
    pub fn fit(prices: &[f64]) -> Result<Self> {
        if prices.len() < 2 {
            return Err(Error::InsufficientData {
                needed: 2,
                got: prices.len(),
            });
        }

        let returns: Vec<f64> = prices
            .windows(2)
            .map(|w| (w[1] / w[0]).ln())
            .collect();

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

        Ok(Self {
            mu: mean * TRADING_DAYS,
            sigma: var.sqrt() * TRADING_DAYS.sqrt(),
            last_price: prices[prices.len() - 1],
        })
    }

    /// Same parameters anchored at a different starting price
    pub fn with_last_price(self, last_price: f64) -> Self {
        Self { last_price, ..self }
    }
}

/// Per-step order statistics across simulated paths
#[derive(Debug, Clone, PartialEq)]
pub struct GbmForecast {
    pub median: Vec<f64>,
    pub lower5: Vec<f64>,
    pub upper95: Vec<f64>,
}

/// Simulate `n_paths` forward price paths over `horizon` steps and
/// reduce them to 5th/50th/95th percentiles at each step.
///
/// Each path draws `horizon` standard-normal increments, scales them by
/// `sqrt(1/horizon)` into a discrete Brownian path `W`, and computes
/// `price(t) = last * exp((mu - sigma^2/2) * t/H + sigma * W[t-1])`.
/// Percentiles index the sorted cross-section at `floor(n_paths * p)`.
pub fn simulate(params: &GbmParams, horizon: usize, n_paths: usize, seed: u64) -> GbmForecast {
    debug!(horizon, n_paths, seed, "running GBM simulation");

    if horizon == 0 || n_paths == 0 {
        return GbmForecast {
            median: Vec::new(),
            lower5: Vec::new(),
            upper95: Vec::new(),
        };
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).expect("unit normal is well-formed");

    let drift = params.mu - 0.5 * params.sigma * params.sigma;
    let sqrt_dt = (1.0 / horizon.max(1) as f64).sqrt();

    // prices[t] holds the cross-section of all paths at step t.
    let mut prices = vec![Vec::with_capacity(n_paths); horizon];

    for _ in 0..n_paths {
        let mut w = 0.0;
        for (t, step) in prices.iter_mut().enumerate() {
            w += normal.sample(&mut rng) * sqrt_dt;
            let frac = (t + 1) as f64 / horizon as f64;
            step.push(params.last_price * (drift * frac + params.sigma * w).exp());
        }
    }

    let mut median = Vec::with_capacity(horizon);
    let mut lower5 = Vec::with_capacity(horizon);
    let mut upper95 = Vec::with_capacity(horizon);

    for step in &mut prices {
        step.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        lower5.push(percentile(step, 0.05));
        median.push(percentile(step, 0.50));
        upper95.push(percentile(step, 0.95));
    }

    GbmForecast {
        median,
        lower5,
        upper95,
    }
}

/// Order statistic of an already sorted slice at `floor(n * p)`
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// GBM model trained end-to-end: parameters fit on the train segment,
/// rolling one-step median evaluation over the test segment.
#[derive(Debug, Clone)]
pub struct GbmModel {
    pub params: GbmParams,
    pub metrics: Metrics,
}

/// Simulation settings shared by evaluation and forecasting
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GbmConfig {
    pub n_paths: usize,
    /// Paths per one-step evaluation draw (smaller, runs once per test day)
    pub eval_paths: usize,
    pub seed: u64,
}

impl Default for GbmConfig {
    fn default() -> Self {
        Self {
            n_paths: 1000,
            eval_paths: 200,
            seed: 42,
        }
    }
}

impl GbmModel {
    /// Fit on the train+val prefix, then evaluate a rolling one-step
    /// median forecast over the test segment. Each test index is
    /// re-seeded with `seed + i` so every evaluation step is
    /// independently reproducible.
    pub fn train(
        prices: &[f64],
        train_frac: f64,
        val_frac: f64,
        config: &GbmConfig,
    ) -> Result<Self> {
        let s = split(prices, train_frac, val_frac)?;

        // GBM has no hyperparameters to tune, so train and val both
        // inform the fit.
        let fit_len = s.train.len() + s.val.len();
        let params = GbmParams::fit(&prices[..fit_len])?;

        let mut predictions = Vec::with_capacity(s.test.len());
        for i in 0..s.test.len() {
            let prev = prices[fit_len + i - 1];
            let step = simulate(
                &params.with_last_price(prev),
                1,
                config.eval_paths,
                config.seed + i as u64,
            );
            predictions.push(step.median[0]);
        }

        let metrics = Metrics::compute(s.test, &predictions);

        Ok(Self { params, metrics })
    }

    /// Full-horizon band forecast anchored at the series' last price
    pub fn forecast(&self, last_price: f64, horizon: usize, config: &GbmConfig) -> GbmForecast {
        simulate(
            &self.params.with_last_price(last_price),
            horizon,
            config.n_paths,
            config.seed,
        )
    }
}
