//! robustboost: adversarially robust gradient-boosted tree growing.
//!
//! Grows regression trees for gradient boosting with a column-wise exact
//! split finder that scores every candidate threshold by its **worst case**
//! under bounded perturbation of feature values: an adversary may move any
//! value by up to `robust_eps`, so rows near a threshold can land on either
//! side. Setting `robust_eps = 0` recovers classical greedy growing.
//!
//! # Key Types
//!
//! - [`TrainParam`] - grower configuration
//! - [`ColMatrix`] - sorted column-major training data
//! - [`RegTree`] - the tree being grown, mutated in place
//! - [`GradientPair`] - per-example loss derivatives (negative hessian =
//!   inactive row)
//! - [`updater::RobustColMaker`] / [`updater::RobustDistColMaker`] - the two
//!   registered updaters
//!
//! # Growing a tree
//!
//! ```
//! use robustboost::{create_updater, ColMatrix, GradientPair, RegTree, TrainParam, TreeUpdater};
//!
//! let matrix = ColMatrix::from_dense(&[1.0, 2.0, 3.0, 4.0], 4, 1).unwrap();
//! let gpair = vec![
//!     GradientPair::new(1.0, 1.0),
//!     GradientPair::new(1.0, 1.0),
//!     GradientPair::new(-1.0, 1.0),
//!     GradientPair::new(-1.0, 1.0),
//! ];
//!
//! let param = TrainParam {
//!     max_depth: 2,
//!     robust_eps: 0.25,
//!     ..Default::default()
//! };
//! let mut updater = create_updater("robust_grow_colmaker", param).unwrap();
//! let mut trees = vec![RegTree::new()];
//! updater.update(&gpair, &matrix, &mut trees).unwrap();
//! assert!(trees[0].num_nodes() >= 1);
//! ```
//!
//! Distributed training partitions feature columns across workers; see
//! [`updater::RobustDistColMaker`] and the [`collective`] module.

// Re-export approx traits for users who want to compare outputs in tests
pub use approx;

pub mod collective;
pub mod data;
pub mod error;
pub mod training;
pub mod tree;
pub mod updater;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use data::{ColEntry, ColMatrix, DataError};
pub use error::TrainError;
pub use training::{
    DefaultDirection, GradStats, GradientPair, ParallelOption, SplitEntry, SplitEvaluator,
    TrainParam, Verbosity,
};
pub use tree::{NodeStat, RegTree};
pub use updater::{create_updater, updater_names, TreeUpdater};
