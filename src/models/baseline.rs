//! Reference sequence-model substrate
//!
//! A minimal linear autoregressor implementing [`SequenceModel`], so the
//! training loop and walk-forward forecasting can run end to end without
//! an external neural substrate. One "epoch" is one full-batch gradient
//! descent step on MSE.

use super::sequence::{EpochStats, SequenceModel};
use crate::error::Result;
use ndarray::{Array1, Array2, ArrayView1};

/// Linear model over a lookback window: `y = w . x + b`
#[derive(Debug, Clone)]
pub struct LinearWindowModel {
    weights: Array1<f64>,
    bias: f64,
    learning_rate: f64,
    snapshot: Option<(Array1<f64>, f64)>,
}

impl LinearWindowModel {
    pub fn new(lookback: usize, learning_rate: f64) -> Self {
        // Initialized to predict the mean of the window, a sane starting
        // point for scaled price data.
        let weights = Array1::from_elem(lookback, 1.0 / lookback as f64);
        Self {
            weights,
            bias: 0.0,
            learning_rate,
            snapshot: None,
        }
    }

    fn forward(&self, window: ArrayView1<'_, f64>) -> f64 {
        self.weights.dot(&window) + self.bias
    }

    fn mse(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        let n = x.nrows();
        if n == 0 {
            return 0.0;
        }
        x.rows()
            .into_iter()
            .zip(y.iter())
            .map(|(row, &target)| (self.forward(row) - target).powi(2))
            .sum::<f64>()
            / n as f64
    }
}

impl SequenceModel for LinearWindowModel {
    fn fit_epoch(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: &Array2<f64>,
        y_val: &Array1<f64>,
    ) -> Result<EpochStats> {
        let n = x.nrows().max(1) as f64;

        let mut grad_w = Array1::<f64>::zeros(self.weights.len());
        let mut grad_b = 0.0;

        for (row, &target) in x.rows().into_iter().zip(y.iter()) {
            let err = self.forward(row) - target;
            grad_w = grad_w + &row.mapv(|v| 2.0 * err * v);
            grad_b += 2.0 * err;
        }

        self.weights = &self.weights - &(grad_w * (self.learning_rate / n));
        self.bias -= self.learning_rate * grad_b / n;

        Ok(EpochStats {
            loss: self.mse(x, y),
            val_loss: self.mse(x_val, y_val),
        })
    }

    fn predict(&self, window: ArrayView1<'_, f64>) -> f64 {
        self.forward(window)
    }

    fn snapshot_weights(&mut self) {
        self.snapshot = Some((self.weights.clone(), self.bias));
    }

    fn restore_weights(&mut self) {
        if let Some((weights, bias)) = self.snapshot.clone() {
            self.weights = weights;
            self.bias = bias;
        }
    }
}
