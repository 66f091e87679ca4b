//! Per-scan scratch arenas.
//!
//! Split enumeration never shares mutable state across threads: each unit of
//! parallel work owns a `Vec<ThreadEntry>` indexed by node id, and the bests
//! accumulated in those arenas are merged serially afterwards. [`NodeEntry`]
//! is the per-node aggregate the merge lands in.

use std::collections::VecDeque;

use crate::training::gradients::{GradStats, GradientPair};
use crate::training::params::TrainParam;
use crate::training::position::PositionMap;
use crate::training::split::SplitEntry;
use crate::training::SplitEvaluator;

/// Scratch for one (scan unit, node) pair during split enumeration.
///
/// During a robust scan at candidate threshold `eta`:
/// - `stats` sums every row seen so far,
/// - `stats_left` sums rows with value `< eta` (certain left under the
///   nominal placement),
/// - `stats_c_left` is its sub-sum for values `< eta - eps` (certain left
///   under any perturbation), with `c_left_counter` rows,
/// - `stats_unc` sums the uncertain window `[eta - eps, eta + eps)`,
/// - `stats_unc_right` is its sub-sum for `[eta, eta + eps)`.
///
/// The two deques hold indices into the column slice for the rows backing
/// `stats_unc_right` and `stats_unc`; the scan runs ascending, so both only
/// push at the back and pop at the front.
#[derive(Debug, Clone, Default)]
pub struct ThreadEntry {
    pub stats: GradStats,
    pub stats_left: GradStats,
    pub stats_c_left: GradStats,
    pub c_left_counter: u32,
    pub stats_unc_right: GradStats,
    pub stats_unc: GradStats,
    /// Column-wide total cached by the row-parallel enumerator.
    pub stats_extra: GradStats,
    pub data_unc_right: VecDeque<u32>,
    pub data_unc: VecDeque<u32>,
    pub last_fvalue: f32,
    pub first_fvalue: f32,
    pub best: SplitEntry,
}

impl ThreadEntry {
    /// Clear everything a new feature scan needs; keeps `best`, which
    /// accumulates across the features one arena sees.
    pub fn clear_scan(&mut self) {
        self.stats.clear();
        self.stats_left.clear();
        self.stats_c_left.clear();
        self.c_left_counter = 0;
        self.stats_unc_right.clear();
        self.stats_unc.clear();
        self.data_unc_right.clear();
        self.data_unc.clear();
    }
}

/// Per-node aggregate: total statistics, unsplit score, weight and the best
/// candidate merged from every arena.
#[derive(Debug, Clone, Default)]
pub struct NodeEntry {
    pub stats: GradStats,
    pub root_gain: f32,
    pub weight: f32,
    pub best: SplitEntry,
}

/// Allocate an arena covering `num_nodes` node ids.
pub fn new_arena(num_nodes: usize) -> Vec<ThreadEntry> {
    vec![ThreadEntry::default(); num_nodes]
}

/// Shared read-only view of the builder state needed by split enumeration.
/// Everything here is borrowed immutably, so the context can be captured by
/// parallel scan closures.
pub struct EnumContext<'a> {
    pub param: &'a TrainParam,
    pub spliteval: &'a dyn SplitEvaluator,
    pub snode: &'a [NodeEntry],
    pub position: &'a PositionMap,
    pub qexpand: &'a [usize],
    pub gpair: &'a [GradientPair],
}
