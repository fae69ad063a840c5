//! CART regression tree with hyperparameter grid search
//!
//! Recursive binary partitioning over the fixed-order feature rows, a
//! leaf predicting the mean target of its training subset. The grid
//! search trains one candidate tree per sampled hyperparameter
//! configuration and keeps the single best by validation RMSE.

use crate::cancel::CancelToken;
use crate::data::split;
use crate::error::{Error, Result};
use crate::features::{FeatureEngine, FeatureRow, N_FEATURES};
use crate::metrics::Metrics;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A subset's target MSE below this is treated as pure.
const PURE_LEAF_MSE: f64 = 1e-12;

/// How many candidate features the split search considers per node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Every feature, in fixed order
    All,
    /// A random subset of size `floor(sqrt(n_features))`
    Sqrt,
    /// A random subset of size `floor(log2(n_features))`
    Log2,
}

impl MaxFeatures {
    fn count(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::Log2 => ((n_features as f64).log2().floor() as usize).max(1),
        }
    }
}

/// One hyperparameter configuration for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: MaxFeatures::All,
        }
    }
}

/// Tree node: a leaf with a scalar prediction, or an internal split.
/// Children are exclusively owned; the structure is a strict binary tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }

    pub fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Internal { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    fn predict(&self, row: &FeatureRow) -> f64 {
        match self {
            TreeNode::Leaf { value, .. } => *value,
            TreeNode::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

/// Trained CART regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    params: TreeParams,
    root: TreeNode,
}

impl RegressionTree {
    /// Train on feature rows and targets. `seed` drives the random
    /// feature subset when `max_features` restricts the search; with
    /// `MaxFeatures::All` the fit is fully deterministic regardless.
    pub fn fit(x: &[FeatureRow], y: &[f64], params: TreeParams, seed: u64) -> Self {
        let indices: Vec<usize> = (0..x.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let root = build_node(x, y, &indices, 0, &params, &mut rng);

        Self { params, root }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Predict the target for a single feature row
    pub fn predict_row(&self, row: &FeatureRow) -> f64 {
        self.root.predict(row)
    }

    /// Predict for every row
    pub fn predict(&self, rows: &[FeatureRow]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

fn subset_mse(y: &[f64], indices: &[usize]) -> f64 {
    let n = indices.len();
    if n == 0 {
        return 0.0;
    }
    let m = mean(indices.iter().map(|&i| y[i]), n);
    indices.iter().map(|&i| (y[i] - m).powi(2)).sum::<f64>() / n as f64
}

fn build_node(
    x: &[FeatureRow],
    y: &[f64],
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> TreeNode {
    let n = indices.len();
    let node_mse = subset_mse(y, indices);
    let leaf = || TreeNode::Leaf {
        value: mean(indices.iter().map(|&i| y[i]), n),
        n_samples: n,
    };

    if depth >= params.max_depth
        || n < params.min_samples_split
        || n < 2 * params.min_samples_leaf
        || node_mse < PURE_LEAF_MSE
    {
        return leaf();
    }

    // Degrades to a leaf when no candidate satisfies min_samples_leaf or
    // improves on the parent; never an error.
    match find_best_split(x, y, indices, node_mse, params, rng) {
        Some((feature, threshold, left_idx, right_idx)) => {
            let left = build_node(x, y, &left_idx, depth + 1, params, rng);
            let right = build_node(x, y, &right_idx, depth + 1, params, rng);
            TreeNode::Internal {
                feature,
                threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        None => leaf(),
    }
}

/// Exhaustive split search: candidate thresholds are midpoints between
/// consecutive unique sorted feature values; the winner minimizes the
/// size-weighted child MSE. Ties keep the first candidate encountered in
/// feature order, then threshold order.
fn find_best_split(
    x: &[FeatureRow],
    y: &[f64],
    indices: &[usize],
    parent_mse: f64,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(usize, f64, Vec<usize>, Vec<usize>)> {
    let candidate_features: Vec<usize> = match params.max_features {
        MaxFeatures::All => (0..N_FEATURES).collect(),
        restricted => {
            let mut all: Vec<usize> = (0..N_FEATURES).collect();
            all.shuffle(rng);
            all.truncate(restricted.count(N_FEATURES));
            all
        }
    };

    let mut best_mse = parent_mse;
    let mut best: Option<(usize, f64, Vec<usize>, Vec<usize>)> = None;

    for &feature in &candidate_features {
        let mut values: Vec<f64> = indices.iter().map(|&i| x[i][feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;

            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[i][feature] <= threshold);

            if left_idx.len() < params.min_samples_leaf
                || right_idx.len() < params.min_samples_leaf
            {
                continue;
            }

            let n_left = left_idx.len() as f64;
            let n_right = right_idx.len() as f64;
            let weighted = (n_left * subset_mse(y, &left_idx)
                + n_right * subset_mse(y, &right_idx))
                / (n_left + n_right);

            if weighted < best_mse {
                best_mse = weighted;
                best = Some((feature, threshold, left_idx, right_idx));
            }
        }
    }

    best
}

/// Option sets enumerated by the grid search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSearchConfig {
    pub max_depths: Vec<usize>,
    pub min_samples_splits: Vec<usize>,
    pub min_samples_leafs: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    /// Hard cap on configurations actually trained; larger grids are
    /// uniformly sampled without replacement down to this many.
    pub max_configs: usize,
    /// Seeds both the grid sub-sampling and per-tree feature subsampling,
    /// making the whole search reproducible.
    pub seed: u64,
}

impl Default for TreeSearchConfig {
    fn default() -> Self {
        Self {
            max_depths: vec![3, 5, 7, 10],
            min_samples_splits: vec![5, 10, 20],
            min_samples_leafs: vec![2, 5, 10],
            max_features: vec![MaxFeatures::All, MaxFeatures::Sqrt, MaxFeatures::Log2],
            max_configs: 50,
            seed: 42,
        }
    }
}

impl TreeSearchConfig {
    /// Cartesian product of the option sets, in enumeration order
    fn enumerate(&self) -> Vec<TreeParams> {
        let mut configs = Vec::new();
        for &max_depth in &self.max_depths {
            for &min_samples_split in &self.min_samples_splits {
                for &min_samples_leaf in &self.min_samples_leafs {
                    for &max_features in &self.max_features {
                        configs.push(TreeParams {
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                            max_features,
                        });
                    }
                }
            }
        }
        configs
    }
}

/// Outcome of a grid search: the single best tree and how it scored
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub tree: RegressionTree,
    pub val_rmse: f64,
    pub configs_tried: usize,
}

/// Train one tree per sampled configuration on the training rows, score
/// each by RMSE on the validation rows, and keep the best
/// (first-encountered wins ties). Checked against the cancellation token
/// between configurations.
pub fn grid_search(
    x_train: &[FeatureRow],
    y_train: &[f64],
    x_val: &[FeatureRow],
    y_val: &[f64],
    config: &TreeSearchConfig,
    cancel: &CancelToken,
) -> Result<GridSearchResult> {
    if x_train.is_empty() || x_val.is_empty() {
        return Err(Error::InsufficientData {
            needed: 1,
            got: 0,
        });
    }

    let mut candidates = config.enumerate();
    if candidates.is_empty() {
        return Err(Error::Model("tree search has empty option sets".into()));
    }
    if candidates.len() > config.max_configs {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        candidates.shuffle(&mut rng);
        candidates.truncate(config.max_configs);
    }
    let configs_tried = candidates.len();
    debug!(configs = configs_tried, "starting tree grid search");

    let mut best: Option<(RegressionTree, f64)> = None;

    for (i, params) in candidates.into_iter().enumerate() {
        cancel.check()?;

        let tree = RegressionTree::fit(x_train, y_train, params, config.seed.wrapping_add(i as u64));
        let predictions = tree.predict(x_val);
        let rmse = crate::metrics::rmse(y_val, &predictions);

        if best.as_ref().map_or(true, |(_, b)| rmse < *b) {
            best = Some((tree, rmse));
        }
    }

    let (tree, val_rmse) = match best {
        Some(b) => b,
        None => return Err(Error::Model("tree grid search trained no candidate".into())),
    };
    info!(val_rmse, params = ?tree.params, "grid search complete");

    Ok(GridSearchResult {
        tree,
        val_rmse,
        configs_tried,
    })
}

/// Tree model trained end-to-end on a price/volume history: grid search
/// on the chronological train/val rows, one-step evaluation on test.
#[derive(Debug, Clone)]
pub struct TreeModel {
    tree: RegressionTree,
    pub val_rmse: f64,
    pub metrics: Metrics,
}

impl TreeModel {
    /// Fit via grid search and evaluate one-step-ahead on the held-out
    /// test rows.
    pub fn train(
        prices: &[f64],
        volumes: &[f64],
        train_frac: f64,
        val_frac: f64,
        config: &TreeSearchConfig,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let (rows, targets) = FeatureEngine.supervised(prices, volumes);

        let x_split = split(&rows, train_frac, val_frac)?;
        let y_split = split(&targets, train_frac, val_frac)?;

        let result = grid_search(
            x_split.train,
            y_split.train,
            x_split.val,
            y_split.val,
            config,
            cancel,
        )?;

        let test_predictions = result.tree.predict(x_split.test);
        let metrics = Metrics::compute(y_split.test, &test_predictions);

        Ok(Self {
            tree: result.tree,
            val_rmse: result.val_rmse,
            metrics,
        })
    }

    pub fn tree(&self) -> &RegressionTree {
        &self.tree
    }

    /// Walk-forward multi-step forecast: each step recomputes the full
    /// feature history including previous predictions, predicts the next
    /// price from the last row, and carries the last known volume
    /// forward. Prediction error compounds across steps by construction.
    pub fn forecast(&self, prices: &[f64], volumes: &[f64], horizon: usize) -> Vec<f64> {
        let mut history = prices.to_vec();
        let mut vols = volumes.to_vec();
        let last_volume = vols.last().copied().unwrap_or(0.0);
        let mut out = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let rows = FeatureEngine.rows(&history, &vols);
            let next = match rows.last() {
                Some(row) => self.tree.predict_row(row),
                None => break,
            };
            out.push(next);
            history.push(next);
            vols.push(last_volume);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant_row(price: f64) -> FeatureRow {
        let mut row = [0.0; N_FEATURES];
        row[0] = price;
        row
    }

    #[test]
    fn test_depth_zero_is_global_mean_leaf() {
        let x: Vec<FeatureRow> = (0..20).map(|i| constant_row(i as f64)).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64 * 2.0).collect();

        let params = TreeParams {
            max_depth: 0,
            ..Default::default()
        };
        let tree = RegressionTree::fit(&x, &y, params, 7);

        assert!(tree.root().is_leaf());
        let expected = y.iter().sum::<f64>() / y.len() as f64;
        assert_relative_eq!(tree.predict_row(&x[0]), expected);
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        // 8 samples with min_samples_leaf=10: no split can be valid.
        let x: Vec<FeatureRow> = (0..8).map(|i| constant_row(i as f64)).collect();
        let y: Vec<f64> = (0..8).map(|i| i as f64).collect();

        let params = TreeParams {
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 10,
            max_features: MaxFeatures::All,
        };
        let tree = RegressionTree::fit(&x, &y, params, 7);

        assert_eq!(tree.root().n_leaves(), 1);
    }

    #[test]
    fn test_recovers_step_function() {
        // Targets jump at price 10; a depth-1 tree should find it.
        let x: Vec<FeatureRow> = (0..20).map(|i| constant_row(i as f64)).collect();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 1.0 } else { 5.0 }).collect();

        let params = TreeParams {
            max_depth: 1,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        };
        let tree = RegressionTree::fit(&x, &y, params, 7);

        assert_relative_eq!(tree.predict_row(&constant_row(3.0)), 1.0);
        assert_relative_eq!(tree.predict_row(&constant_row(15.0)), 5.0);
    }

    #[test]
    fn test_fit_is_deterministic_given_seed() {
        let x: Vec<FeatureRow> = (0..40)
            .map(|i| {
                let mut row = constant_row(i as f64);
                row[1] = (i as f64 * 0.7).sin();
                row
            })
            .collect();
        let y: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).cos()).collect();

        let params = TreeParams {
            max_features: MaxFeatures::Sqrt,
            ..Default::default()
        };
        let a = RegressionTree::fit(&x, &y, params, 123);
        let b = RegressionTree::fit(&x, &y, params, 123);

        for row in &x {
            assert_eq!(a.predict_row(row), b.predict_row(row));
        }
    }

    #[test]
    fn test_grid_search_respects_cap() {
        let x: Vec<FeatureRow> = (0..60).map(|i| constant_row(i as f64)).collect();
        let y: Vec<f64> = (0..60).map(|i| i as f64).collect();

        let config = TreeSearchConfig {
            max_configs: 5,
            ..Default::default()
        };
        let result = grid_search(&x[..50], &y[..50], &x[50..], &y[50..], &config, &CancelToken::new())
            .unwrap();

        assert_eq!(result.configs_tried, 5);
        assert!(result.val_rmse.is_finite());
    }

    #[test]
    fn test_grid_search_cancellation() {
        let x: Vec<FeatureRow> = (0..20).map(|i| constant_row(i as f64)).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();

        let cancel = CancelToken::new();
        cancel.cancel();

        let result = grid_search(
            &x[..15],
            &y[..15],
            &x[15..],
            &y[15..],
            &TreeSearchConfig::default(),
            &cancel,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_forecast_returns_horizon_values() {
        let prices: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.1).sin() * 3.0).collect();
        let volumes = vec![1000.0; 120];

        let config = TreeSearchConfig {
            max_depths: vec![3],
            min_samples_splits: vec![5],
            min_samples_leafs: vec![2],
            max_features: vec![MaxFeatures::All],
            max_configs: 50,
            seed: 42,
        };
        let model =
            TreeModel::train(&prices, &volumes, 0.8, 0.1, &config, &CancelToken::new()).unwrap();

        let forecast = model.forecast(&prices, &volumes, 30);
        assert_eq!(forecast.len(), 30);
        assert!(forecast.iter().all(|p| p.is_finite()));
    }
}
