//! Run orchestration
//!
//! Trains the three models sequentially (tree, GBM, sequence regressor),
//! evaluates each on the held-out test segment, produces per-model
//! forecasts, and blends whichever models succeeded into an ensemble.
//! Per-model failures are recorded and do not abort the run;
//! cancellation does.

use crate::cancel::CancelToken;
use crate::data::PriceSeries;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::models::{
    blend, Band, EnsembleForecast, GbmConfig, GbmModel, ModelForecast, SequenceModel, TrainerConfig,
    TreeModel, TreeSearchConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Margin of history required beyond lookback + horizon before any
/// model is allowed to run.
const MIN_MARGIN: usize = 50;

/// Receives advisory progress updates: a monotonically increasing
/// percentage and a human-readable status. Nothing is read back.
pub trait ProgressObserver {
    fn report(&mut self, percent: f64, status: &str);
}

/// Default observer that forwards progress to `tracing`
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn report(&mut self, percent: f64, status: &str) {
        info!(percent, "{status}");
    }
}

/// Settings for a full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Forecast horizon in trading days
    pub horizon: usize,
    pub train_frac: f64,
    pub val_frac: f64,
    pub tree: TreeSearchConfig,
    pub gbm: GbmConfig,
    pub trainer: TrainerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            horizon: 30,
            train_frac: 0.8,
            val_frac: 0.1,
            tree: TreeSearchConfig::default(),
            gbm: GbmConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

/// One model's finished output: held-out accuracy plus its forward
/// forecast (and band, when the model produces one)
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub metrics: Metrics,
    pub point: Vec<f64>,
    pub band: Option<Band>,
}

/// Outcome of a full run. Models that failed are absent from the
/// success fields and listed in `failures` instead.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub tree: Option<ModelRun>,
    pub gbm: Option<ModelRun>,
    pub sequence: Option<ModelRun>,
    pub ensemble: Option<EnsembleForecast>,
    /// `(model name, error message)` for each model that failed
    pub failures: Vec<(String, String)>,
}

/// Record a non-fatal per-model failure; cancellation still aborts.
fn record_failure(report: &mut RunReport, name: &str, err: Error) -> Result<()> {
    if matches!(err, Error::Cancelled) {
        return Err(err);
    }
    warn!(model = name, %err, "model failed, continuing without it");
    report.failures.push((name.to_string(), err.to_string()));
    Ok(())
}

/// Train, evaluate, and forecast all three models, then blend.
///
/// `substrate` is the externally owned sequence-model primitive; the
/// pipeline drives it through the epoch loop and never inspects it.
pub fn run<M: SequenceModel>(
    series: &PriceSeries,
    substrate: &mut M,
    config: &PipelineConfig,
    observer: &mut dyn ProgressObserver,
    cancel: &CancelToken,
) -> Result<RunReport> {
    series.require_len(config.trainer.lookback + config.horizon + MIN_MARGIN)?;

    let prices = series.closes();
    let volumes = series.volumes();
    let last_price = prices[prices.len() - 1];

    let mut report = RunReport::default();

    // Decision tree
    observer.report(0.0, "training decision tree (grid search)");
    match TreeModel::train(
        &prices,
        &volumes,
        config.train_frac,
        config.val_frac,
        &config.tree,
        cancel,
    ) {
        Ok(model) => {
            let point = model.forecast(&prices, &volumes, config.horizon);
            report.tree = Some(ModelRun {
                metrics: model.metrics,
                point,
                band: None,
            });
        }
        Err(err) => record_failure(&mut report, "tree", err)?,
    }

    // GBM Monte Carlo
    observer.report(40.0, "fitting GBM and simulating paths");
    cancel.check()?;
    match GbmModel::train(&prices, config.train_frac, config.val_frac, &config.gbm) {
        Ok(model) => {
            let forecast = model.forecast(last_price, config.horizon, &config.gbm);
            report.gbm = Some(ModelRun {
                metrics: model.metrics,
                point: forecast.median,
                band: Some(Band {
                    lower5: forecast.lower5,
                    upper95: forecast.upper95,
                }),
            });
        }
        Err(err) => record_failure(&mut report, "gbm", err)?,
    }

    // Sequence regressor
    observer.report(60.0, "training sequence regressor");
    let epoch_span = 35.0 / config.trainer.max_epochs as f64;
    let mut epoch_progress = 60.0;
    let train_result = crate::models::train(
        substrate,
        &prices,
        config.train_frac,
        config.val_frac,
        &config.trainer,
        cancel,
        |epoch, loss, val_loss| {
            epoch_progress = 60.0 + epoch_span * (epoch + 1) as f64;
            info!(epoch, loss, val_loss, "sequence epoch");
        },
    );
    match train_result {
        Ok(trained) => match trained.forecast(substrate, &prices, config.horizon) {
            Ok(point) => {
                observer.report(epoch_progress, "sequence regressor trained");
                report.sequence = Some(ModelRun {
                    metrics: trained.metrics,
                    point,
                    band: None,
                });
            }
            Err(err) => record_failure(&mut report, "sequence", err)?,
        },
        Err(err) => record_failure(&mut report, "sequence", err)?,
    }

    // Ensemble over whatever succeeded
    observer.report(95.0, "blending ensemble");
    let contributions: Vec<ModelForecast> = [
        ("tree", &report.tree),
        ("gbm", &report.gbm),
        ("sequence", &report.sequence),
    ]
    .iter()
    .filter_map(|(name, run)| {
        run.as_ref().map(|r| ModelForecast {
            name: name.to_string(),
            point: r.point.clone(),
            band: r.band.clone(),
        })
    })
    .collect();

    if !contributions.is_empty() {
        report.ensemble = Some(blend(&contributions, Some("gbm"))?);
    }

    observer.report(100.0, "run complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::models::LinearWindowModel;
    use chrono::NaiveDate;

    fn synthetic_series(n: usize) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars = (0..n)
            .map(|i| {
                let price = 100.0 * (1.0 + 0.0005 * i as f64) + (i as f64 * 0.25).sin() * 2.0;
                Bar::new(
                    start + chrono::Duration::days(i as i64),
                    price,
                    price + 1.0,
                    price - 1.0,
                    price,
                    1_000.0 + (i % 7) as f64 * 50.0,
                )
            })
            .collect();
        PriceSeries::new(bars).unwrap()
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            horizon: 10,
            tree: TreeSearchConfig {
                max_depths: vec![3],
                min_samples_splits: vec![10],
                min_samples_leafs: vec![5],
                max_features: vec![crate::models::MaxFeatures::All],
                max_configs: 50,
                seed: 42,
            },
            gbm: GbmConfig {
                n_paths: 100,
                eval_paths: 50,
                seed: 42,
            },
            trainer: TrainerConfig {
                lookback: 10,
                max_epochs: 10,
                patience: 3,
            },
            ..Default::default()
        }
    }

    struct Silent;
    impl ProgressObserver for Silent {
        fn report(&mut self, _percent: f64, _status: &str) {}
    }

    #[test]
    fn test_full_run_produces_all_models_and_ensemble() {
        let series = synthetic_series(250);
        let config = fast_config();
        let mut substrate = LinearWindowModel::new(config.trainer.lookback, 0.1);

        let report = run(
            &series,
            &mut substrate,
            &config,
            &mut Silent,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(report.failures.is_empty());
        for model in [&report.tree, &report.gbm, &report.sequence] {
            let run = model.as_ref().unwrap();
            assert_eq!(run.point.len(), config.horizon);
            assert!(run.metrics.rmse.is_finite());
        }

        let ensemble = report.ensemble.unwrap();
        assert_eq!(ensemble.point.len(), config.horizon);
        for t in 0..config.horizon {
            assert!(ensemble.lower5[t] <= ensemble.point[t]);
            assert!(ensemble.point[t] <= ensemble.upper95[t]);
        }
    }

    #[test]
    fn test_too_short_series_rejected() {
        let series = synthetic_series(30);
        let config = fast_config();
        let mut substrate = LinearWindowModel::new(config.trainer.lookback, 0.1);

        let result = run(
            &series,
            &mut substrate,
            &config,
            &mut Silent,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }

    #[test]
    fn test_cancellation_aborts_run() {
        let series = synthetic_series(250);
        let config = fast_config();
        let mut substrate = LinearWindowModel::new(config.trainer.lookback, 0.1);

        let cancel = CancelToken::new();
        cancel.cancel();

        let result = run(&series, &mut substrate, &config, &mut Silent, &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_substrate_failure_degrades_gracefully() {
        struct FailingModel;
        impl SequenceModel for FailingModel {
            fn fit_epoch(
                &mut self,
                _x: &ndarray::Array2<f64>,
                _y: &ndarray::Array1<f64>,
                _x_val: &ndarray::Array2<f64>,
                _y_val: &ndarray::Array1<f64>,
            ) -> crate::error::Result<crate::models::EpochStats> {
                Err(Error::Model("substrate exploded".into()))
            }
            fn predict(&self, _window: ndarray::ArrayView1<'_, f64>) -> f64 {
                0.0
            }
            fn snapshot_weights(&mut self) {}
            fn restore_weights(&mut self) {}
        }

        let series = synthetic_series(250);
        let config = fast_config();

        let report = run(
            &series,
            &mut FailingModel,
            &config,
            &mut Silent,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(report.sequence.is_none());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "sequence");
        // Tree and GBM still succeeded and blended.
        assert!(report.tree.is_some());
        assert!(report.gbm.is_some());
        assert!(report.ensemble.is_some());
    }
}
