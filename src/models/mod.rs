//! Forecasting models module
//!
//! The CART regression tree, the GBM Monte Carlo simulator, the
//! sequence-regressor training loop with its substrate seam, and the
//! ensemble blender.

mod baseline;
mod ensemble;
mod gbm;
mod sequence;
mod tree;

pub use baseline::LinearWindowModel;
pub use ensemble::{blend, Band, EnsembleForecast, ModelForecast};
pub use gbm::{simulate, GbmConfig, GbmForecast, GbmModel, GbmParams};
pub use sequence::{train, EpochStats, SequenceModel, TrainedSequence, TrainerConfig};
pub use tree::{
    grid_search, GridSearchResult, MaxFeatures, RegressionTree, TreeModel, TreeNode, TreeParams,
    TreeSearchConfig,
};
