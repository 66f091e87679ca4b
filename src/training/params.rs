//! Training parameters for the robust column-wise tree growers.

use crate::error::TrainError;
use crate::training::logger::Verbosity;

/// How split enumeration work is scheduled across threads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParallelOption {
    /// Fan out over features; each feature is scanned by one thread.
    #[default]
    Feature,
    /// Partition each feature's rows into per-thread chunks.
    Row,
    /// Pick [`ParallelOption::Feature`] when features are plentiful
    /// (`2 * num_features >= nthread`), otherwise [`ParallelOption::Row`].
    Auto,
}

/// Where rows missing a feature are routed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DefaultDirection {
    /// Learn the direction: run both scan directions and keep the better.
    #[default]
    Learn,
    /// Always route missing rows left.
    Left,
    /// Always route missing rows right.
    Right,
}

/// Parameters for growing one tree.
///
/// `robust_eps` is the adversary's budget: every feature value may be
/// perturbed by up to `±robust_eps` at test time, and split selection scores
/// each candidate by its worst case over those perturbations. `0.0` recovers
/// classical greedy growing.
#[derive(Debug, Clone)]
pub struct TrainParam {
    /// Shrinkage applied to leaf weights.
    pub learning_rate: f32,
    /// Maximum tree depth; `0` keeps the root as a single leaf.
    pub max_depth: u32,
    /// Minimum hessian sum required on each side of a split.
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights.
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights.
    pub reg_alpha: f64,
    /// Row subsampling ratio in `(0, 1]`, drawn once per tree.
    pub subsample: f32,
    /// Feature subsampling ratio applied once per tree.
    pub colsample_bytree: f32,
    /// Feature subsampling ratio re-applied at every depth level.
    pub colsample_bylevel: f32,
    /// Split enumeration scheduling.
    pub parallel_option: ParallelOption,
    /// Name of the split evaluator to instantiate.
    pub split_evaluator: String,
    /// Adversarial perturbation radius (`ε ≥ 0`).
    pub robust_eps: f32,
    /// Default branch policy for missing values.
    pub default_direction: DefaultDirection,
    /// Density at or below which sparse columns get a forward scan.
    pub opt_dense_col: f32,
    /// Seed for subsampling draws.
    pub seed: u64,
    /// Progress output level.
    pub verbosity: Verbosity,
}

impl Default for TrainParam {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            colsample_bylevel: 1.0,
            parallel_option: ParallelOption::Feature,
            split_evaluator: "elastic_net".to_string(),
            robust_eps: 0.0,
            default_direction: DefaultDirection::Learn,
            opt_dense_col: 1.0,
            seed: 42,
            verbosity: Verbosity::Silent,
        }
    }
}

impl TrainParam {
    /// Whether a feature needs the forward (ascending, default-right) scan.
    ///
    /// `indicator` flags columns whose present values are all identical;
    /// routing their missing rows right adds nothing the backward scan does
    /// not already cover.
    #[inline]
    pub fn need_forward_search(&self, col_density: f32, indicator: bool) -> bool {
        match self.default_direction {
            DefaultDirection::Right => true,
            DefaultDirection::Learn => !indicator && col_density <= self.opt_dense_col,
            DefaultDirection::Left => false,
        }
    }

    /// Whether a feature needs the backward (default-left) scan.
    #[inline]
    pub fn need_backward_search(&self, _col_density: f32, _indicator: bool) -> bool {
        self.default_direction != DefaultDirection::Right
    }

    /// Check ranges that would otherwise fail deep inside the builder.
    pub fn validate(&self) -> Result<(), TrainError> {
        fn ratio(name: &'static str, value: f32) -> Result<(), TrainError> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(TrainError::InvalidParam {
                    name,
                    reason: format!("must be in (0, 1], got {value}"),
                })
            }
        }

        ratio("subsample", self.subsample)?;
        ratio("colsample_bytree", self.colsample_bytree)?;
        ratio("colsample_bylevel", self.colsample_bylevel)?;
        ratio("opt_dense_col", self.opt_dense_col)?;

        if !self.robust_eps.is_finite() || self.robust_eps < 0.0 {
            return Err(TrainError::InvalidParam {
                name: "robust_eps",
                reason: format!("must be finite and non-negative, got {}", self.robust_eps),
            });
        }
        if self.min_child_weight < 0.0 {
            return Err(TrainError::InvalidParam {
                name: "min_child_weight",
                reason: format!("must be non-negative, got {}", self.min_child_weight),
            });
        }
        Ok(())
    }
}
