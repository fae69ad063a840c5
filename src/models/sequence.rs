//! Sequence-regressor training control loop
//!
//! The numeric substrate (layers, gradients, weight updates) is
//! externally owned behind the [`SequenceModel`] trait; this module owns
//! everything around it: train-only scaling, context-padded validation
//! windows, epoch-wise early stopping with weight snapshot/restore, and
//! walk-forward multi-step forecasting.

use crate::cancel::CancelToken;
use crate::data::{build_sequences, split, Scaler};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Losses reported by one training epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub loss: f64,
    pub val_loss: f64,
}

/// The externally owned sequence-model primitive.
///
/// The trainer never inspects model internals: it drives epochs, reads
/// the reported losses, snapshots/restores weights opaquely, and asks
/// for one-step predictions. Resource disposal is the implementor's
/// `Drop`.
pub trait SequenceModel {
    /// Run a single training epoch over the supervised windows and
    /// report train/validation loss.
    fn fit_epoch(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: &Array2<f64>,
        y_val: &Array1<f64>,
    ) -> Result<EpochStats>;

    /// Predict the next scaled value from one lookback window
    fn predict(&self, window: ArrayView1<'_, f64>) -> f64;

    /// Store the current weights as the rollback point
    fn snapshot_weights(&mut self);

    /// Restore the most recent snapshot
    fn restore_weights(&mut self);
}

/// Trainer settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub lookback: usize,
    /// Epoch budget
    pub max_epochs: usize,
    /// Epochs without validation improvement before restore-and-halt
    pub patience: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            max_epochs: 50,
            patience: 5,
        }
    }
}

/// Early-stopping state: either the last epoch improved the monitored
/// validation loss, or the loop has plateaued for `n` epochs. The single
/// terminal transition (patience exhausted) restores the best snapshot
/// and halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Improving,
    Plateauing(usize),
}

/// Epoch-wise training with manual early stopping.
///
/// The observer is invoked once per epoch with
/// `(epoch_index, train_loss, val_loss)`; together with the cancellation
/// check it forms the loop's cooperative yield point.
pub fn train<M, F>(
    model: &mut M,
    prices: &[f64],
    train_frac: f64,
    val_frac: f64,
    config: &TrainerConfig,
    cancel: &CancelToken,
    mut on_epoch: F,
) -> Result<TrainedSequence>
where
    M: SequenceModel,
    F: FnMut(usize, f64, f64),
{
    let s = split(prices, train_frac, val_frac)?;
    if s.train.len() <= config.lookback {
        return Err(Error::InsufficientData {
            needed: config.lookback + 1,
            got: s.train.len(),
        });
    }

    // Leakage boundary: the scaler sees training data only.
    let scaler = Scaler::fit(s.train);

    let scaled_train = scaler.transform(s.train);
    let (x_train, y_train) = build_sequences(&scaled_train, config.lookback)?;

    // Context-pad validation with the trailing lookback points of train,
    // so every val target has a full window and none is spent on warm-up.
    let mut val_padded = s.train[s.train.len() - config.lookback..].to_vec();
    val_padded.extend_from_slice(s.val);
    let scaled_val = scaler.transform(&val_padded);
    let (x_val, y_val) = build_sequences(&scaled_val, config.lookback)?;

    let mut best_val_loss = f64::INFINITY;
    let mut phase = Phase::Improving;

    for epoch in 0..config.max_epochs {
        cancel.check()?;

        let stats = model.fit_epoch(&x_train, &y_train, &x_val, &y_val)?;
        on_epoch(epoch, stats.loss, stats.val_loss);
        debug!(epoch, loss = stats.loss, val_loss = stats.val_loss, "epoch complete");

        if stats.val_loss < best_val_loss {
            best_val_loss = stats.val_loss;
            model.snapshot_weights();
            phase = Phase::Improving;
        } else {
            let stalled = match phase {
                Phase::Improving => 1,
                Phase::Plateauing(n) => n + 1,
            };
            if stalled >= config.patience {
                model.restore_weights();
                info!(epoch, best_val_loss, "early stopping, best weights restored");
                break;
            }
            phase = Phase::Plateauing(stalled);
        }
    }

    // Evaluation context: the test segment padded with the trailing
    // lookback points of everything before it.
    let pre_test = s.train.len() + s.val.len();
    let mut test_padded = prices[pre_test - config.lookback..pre_test].to_vec();
    test_padded.extend_from_slice(s.test);
    let scaled_test = scaler.transform(&test_padded);
    let (x_test, y_test) = build_sequences(&scaled_test, config.lookback)?;

    let predictions: Vec<f64> = x_test
        .rows()
        .into_iter()
        .map(|w| scaler.inverse_one(model.predict(w)))
        .collect();
    let actuals: Vec<f64> = y_test.iter().map(|&v| scaler.inverse_one(v)).collect();
    let metrics = Metrics::compute(&actuals, &predictions);

    Ok(TrainedSequence {
        scaler,
        lookback: config.lookback,
        best_val_loss,
        metrics,
    })
}

/// Training outcome: the scaler and window geometry needed to forecast,
/// plus held-out accuracy. The model itself stays with the caller.
#[derive(Debug, Clone)]
pub struct TrainedSequence {
    scaler: Scaler,
    lookback: usize,
    pub best_val_loss: f64,
    pub metrics: Metrics,
}

impl TrainedSequence {
    /// Walk-forward forecast: feed the last `lookback` scaled points,
    /// predict one step, append the prediction (not the truth), repeat
    /// `horizon` times, inverse-scale the whole output. Error compounds
    /// across steps by construction.
    pub fn forecast<M: SequenceModel>(
        &self,
        model: &M,
        prices: &[f64],
        horizon: usize,
    ) -> Result<Vec<f64>> {
        if prices.len() < self.lookback {
            return Err(Error::InsufficientData {
                needed: self.lookback,
                got: prices.len(),
            });
        }

        let tail = &prices[prices.len() - self.lookback..];
        let mut window = self.scaler.transform(tail);
        let mut out = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let pred = model.predict(ArrayView1::from(&window[..]));
            out.push(pred);
            window.remove(0);
            window.push(pred);
        }

        Ok(self.scaler.inverse(&out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted substrate: reports a fixed schedule of validation losses
    /// and records snapshot/restore calls.
    struct ScriptedModel {
        val_losses: Vec<f64>,
        epoch: usize,
        snapshots: usize,
        restores: usize,
        weight: f64,
        saved_weight: f64,
    }

    impl ScriptedModel {
        fn new(val_losses: Vec<f64>) -> Self {
            Self {
                val_losses,
                epoch: 0,
                snapshots: 0,
                restores: 0,
                weight: 0.0,
                saved_weight: 0.0,
            }
        }
    }

    impl SequenceModel for ScriptedModel {
        fn fit_epoch(
            &mut self,
            _x: &Array2<f64>,
            _y: &Array1<f64>,
            _x_val: &Array2<f64>,
            _y_val: &Array1<f64>,
        ) -> Result<EpochStats> {
            let val_loss = self.val_losses[self.epoch.min(self.val_losses.len() - 1)];
            self.epoch += 1;
            self.weight = self.epoch as f64;
            Ok(EpochStats {
                loss: val_loss,
                val_loss,
            })
        }

        fn predict(&self, window: ArrayView1<'_, f64>) -> f64 {
            *window.last().unwrap()
        }

        fn snapshot_weights(&mut self) {
            self.snapshots += 1;
            self.saved_weight = self.weight;
        }

        fn restore_weights(&mut self) {
            self.restores += 1;
            self.weight = self.saved_weight;
        }
    }

    fn prices(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    #[test]
    fn test_early_stopping_restores_best() {
        // Improves twice, then plateaus; patience 3 should halt at epoch
        // 5 and restore the weights snapshotted after epoch 2.
        let mut model = ScriptedModel::new(vec![1.0, 0.5, 0.9, 0.9, 0.9, 0.9, 0.9]);
        let config = TrainerConfig {
            lookback: 5,
            max_epochs: 50,
            patience: 3,
        };

        train(
            &mut model,
            &prices(100),
            0.8,
            0.1,
            &config,
            &CancelToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(model.epoch, 5);
        assert_eq!(model.snapshots, 2);
        assert_eq!(model.restores, 1);
        assert_eq!(model.weight, 2.0);
    }

    #[test]
    fn test_runs_full_budget_when_improving() {
        let losses: Vec<f64> = (0..50).map(|i| 1.0 / (i + 1) as f64).collect();
        let mut model = ScriptedModel::new(losses);
        let config = TrainerConfig {
            lookback: 5,
            max_epochs: 10,
            patience: 3,
        };

        train(
            &mut model,
            &prices(100),
            0.8,
            0.1,
            &config,
            &CancelToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(model.epoch, 10);
        assert_eq!(model.restores, 0);
    }

    #[test]
    fn test_observer_sees_every_epoch() {
        let mut model = ScriptedModel::new(vec![1.0, 0.9, 0.8, 0.7]);
        let config = TrainerConfig {
            lookback: 5,
            max_epochs: 4,
            patience: 5,
        };

        let mut seen = Vec::new();
        train(
            &mut model,
            &prices(100),
            0.8,
            0.1,
            &config,
            &CancelToken::new(),
            |epoch, loss, val_loss| seen.push((epoch, loss, val_loss)),
        )
        .unwrap();

        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[3].0, 3);
    }

    #[test]
    fn test_cancellation_stops_loop() {
        let mut model = ScriptedModel::new(vec![1.0; 50]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = train(
            &mut model,
            &prices(100),
            0.8,
            0.1,
            &TrainerConfig::default(),
            &cancel,
            |_, _, _| {},
        );

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(model.epoch, 0);
    }

    #[test]
    fn test_forecast_walks_forward() {
        let data = prices(100);
        let mut model = ScriptedModel::new(vec![1.0, 0.5]);
        let config = TrainerConfig {
            lookback: 5,
            max_epochs: 2,
            patience: 5,
        };

        let trained = train(
            &mut model,
            &data,
            0.8,
            0.1,
            &config,
            &CancelToken::new(),
            |_, _, _| {},
        )
        .unwrap();

        // ScriptedModel predicts "last window value", so the walk-forward
        // forecast repeats the final price.
        let forecast = trained.forecast(&model, &data, 10).unwrap();
        assert_eq!(forecast.len(), 10);
        for v in &forecast {
            assert!((v - data.last().unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_insufficient_data() {
        let mut model = ScriptedModel::new(vec![1.0]);
        let result = train(
            &mut model,
            &prices(10),
            0.8,
            0.1,
            &TrainerConfig::default(),
            &CancelToken::new(),
            |_, _, _| {},
        );
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }
}
