//! Error types for tree growing.

use thiserror::Error;

/// Failures surfaced by the tree updaters.
///
/// Everything here is either a configuration mistake or a broken invariant;
/// ordinary control flow (a node that finds no profitable split, a candidate
/// gated out by `min_child_weight`) never produces an error.
#[derive(Debug, Clone, Error)]
pub enum TrainError {
    #[error("parameter `{name}` is invalid: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("updater can only grow a fresh tree ({num_nodes} nodes, {num_roots} roots)")]
    NotFreshTree { num_nodes: usize, num_roots: usize },

    #[error("row {row} has root index {root} but the tree has {num_roots} roots")]
    RootIndexOutOfRange {
        row: usize,
        root: u32,
        num_roots: usize,
    },

    #[error("row index {row} out of bounds for position table of length {len}")]
    RowOutOfBounds { row: usize, len: usize },

    #[error("reduced split bitmap routes row {row} through leaf node {nid}")]
    InconsistentReduce { row: usize, nid: usize },

    #[error("distributed updater grows exactly one tree per call, got {got}")]
    SingleTreeOnly { got: usize },

    #[error("unknown tree updater `{0}`")]
    UnknownUpdater(String),

    #[error("unknown split evaluator `{0}`")]
    UnknownEvaluator(String),
}
