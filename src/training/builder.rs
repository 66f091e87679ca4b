//! Level-synchronous tree growing.
//!
//! The [`Builder`] grows one tree breadth-first. Each level runs the same
//! pipeline: enumerate candidate splits for every pending node
//! ([`Builder::find_split`]), re-route rows to the new children
//! (`reset_position`), aggregate statistics for the children
//! (`init_new_node`), then swap the pending queue for the new leaves. Rows
//! are tracked through the encoded [`PositionMap`]; per-node aggregates live
//! in [`NodeEntry`] slots indexed by node id.
//!
//! With a [`Collective`] attached, the same builder grows identical trees on
//! column-partitioned workers: per-node bests and row re-routing decisions
//! are reduced across workers, everything else is local.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::collective::{BitMap, Collective};
use crate::data::ColMatrix;
use crate::error::TrainError;
use crate::training::enumerate::{enumerate_split, ScanDirection};
use crate::training::gradients::{GradStats, GradientPair};
use crate::training::logger::TrainingLogger;
use crate::training::parallel::parallel_find_split;
use crate::training::params::{ParallelOption, TrainParam};
use crate::training::position::{PositionMap, RowRoute};
use crate::training::scratch::{new_arena, EnumContext, NodeEntry, ThreadEntry};
use crate::training::{SplitEntry, SplitEvaluator, RT_EPS};
use crate::tree::RegTree;

/// Grows a single regression tree over a column matrix.
pub struct Builder {
    param: TrainParam,
    nthread: usize,
    feat_index: Vec<u32>,
    position: PositionMap,
    snode: Vec<NodeEntry>,
    qexpand: Vec<usize>,
    spliteval: Box<dyn SplitEvaluator>,
    collective: Option<Arc<dyn Collective>>,
    rng: Xoshiro256PlusPlus,
    logger: TrainingLogger,
}

impl Builder {
    pub fn new(param: TrainParam, spliteval: Box<dyn SplitEvaluator>) -> Self {
        let rng = Xoshiro256PlusPlus::seed_from_u64(param.seed);
        let logger = TrainingLogger::new(param.verbosity);
        Self {
            param,
            nthread: rayon::current_num_threads(),
            feat_index: Vec::new(),
            position: PositionMap::default(),
            snode: Vec::new(),
            qexpand: Vec::new(),
            spliteval,
            collective: None,
            rng,
            logger,
        }
    }

    /// Attach a worker collective; candidate and position reductions then run
    /// across workers.
    pub fn with_collective(mut self, collective: Arc<dyn Collective>) -> Self {
        self.collective = Some(collective);
        self
    }

    /// Grow `tree` from scratch for the given gradients.
    pub fn update(
        &mut self,
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        tree: &mut RegTree,
    ) -> Result<(), TrainError> {
        self.param.validate()?;
        self.init_data(gpair, matrix, tree)?;
        let roots = self.qexpand.clone();
        self.init_new_node(&roots, gpair, matrix, tree);

        for depth in 0..self.param.max_depth {
            self.find_split(depth, gpair, matrix, tree);
            self.reset_position(matrix, tree)?;
            let new_nodes = Self::update_queue_expand(&self.qexpand, tree);
            self.init_new_node(&new_nodes, gpair, matrix, tree);

            let expanded = std::mem::replace(&mut self.qexpand, new_nodes);
            for &nid in &expanded {
                if tree.is_leaf(nid) {
                    continue;
                }
                let left = tree.left_child(nid);
                let right = tree.right_child(nid);
                self.spliteval.add_split(
                    nid,
                    left,
                    right,
                    self.snode[nid].best.split_index,
                    self.snode[left].weight as f64,
                    self.snode[right].weight as f64,
                );
            }
            if self.qexpand.is_empty() {
                break;
            }
        }

        // Whatever is still pending becomes a leaf.
        for nid in self.qexpand.clone() {
            tree.set_leaf(nid, self.snode[nid].weight * self.param.learning_rate);
        }
        // Record per-node training statistics on the finished tree.
        for nid in 0..tree.num_nodes() {
            let entry = &self.snode[nid];
            let stat = tree.stat_mut(nid);
            stat.loss_chg = entry.best.loss_chg;
            stat.base_weight = entry.weight;
            stat.sum_hess = entry.stats.sum_hess as f32;
            stat.leaf_vec = vec![entry.weight];
        }
        self.logger.finish_tree(tree.num_nodes());
        Ok(())
    }

    /// Encoded row positions after growing; distributed callers read these
    /// back once pruning has settled.
    pub fn leaf_positions(&self) -> &[i32] {
        self.position.raw()
    }

    /// Re-resolve every row after external pruning: rows whose node was
    /// deleted walk up to the surviving ancestor, and every row comes back
    /// active.
    pub fn update_position(&mut self, matrix: &ColMatrix, tree: &RegTree) {
        for &ridx in matrix.buffered_rowset() {
            let ridx = ridx as usize;
            let mut nid = self.position.decode(ridx);
            while tree.is_deleted(nid) {
                nid = tree
                    .parent(nid)
                    .expect("a deleted node always has a parent");
            }
            self.position.reactivate_at(ridx, nid);
        }
    }

    // =========================================================================
    // Level pipeline
    // =========================================================================

    fn init_data(
        &mut self,
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        tree: &RegTree,
    ) -> Result<(), TrainError> {
        tree.check_fresh()?;
        if matrix.num_row() > gpair.len() {
            return Err(TrainError::RowOutOfBounds {
                row: matrix.num_row() - 1,
                len: gpair.len(),
            });
        }

        let rowset = matrix.buffered_rowset();
        self.position.reset(gpair.len());
        let root_index = matrix.root_index();
        if !root_index.is_empty() {
            for &ridx in rowset {
                let root = root_index[ridx as usize];
                if root as usize >= tree.num_roots() {
                    return Err(TrainError::RootIndexOutOfRange {
                        row: ridx as usize,
                        root,
                        num_roots: tree.num_roots(),
                    });
                }
                self.position.set_root(ridx as usize, root as usize);
            }
        }
        for &ridx in rowset {
            if gpair[ridx as usize].hess() < 0.0 {
                self.position.deactivate(ridx as usize);
            }
        }
        if self.param.subsample < 1.0 {
            let p = self.param.subsample as f64;
            for &ridx in rowset {
                if gpair[ridx as usize].hess() < 0.0 {
                    continue;
                }
                if !self.rng.gen_bool(p) {
                    self.position.deactivate(ridx as usize);
                }
            }
        }

        self.feat_index.clear();
        for fid in 0..matrix.num_col() as u32 {
            if matrix.col_size(fid) != 0 {
                self.feat_index.push(fid);
            }
        }
        let keep = ((self.param.colsample_bytree * self.feat_index.len() as f32) as usize).max(1);
        self.feat_index.shuffle(&mut self.rng);
        self.feat_index.truncate(keep);

        self.snode.clear();
        self.qexpand = (0..tree.num_roots()).collect();

        let active = rowset
            .iter()
            .filter(|&&r| self.position.active_node(r as usize).is_some())
            .count();
        self.logger
            .start_tree(rowset.len(), active, self.feat_index.len());
        Ok(())
    }

    /// Aggregate gradient statistics for each pending node, then derive its
    /// unsplit weight and score.
    fn init_new_node(
        &mut self,
        qexpand: &[usize],
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        tree: &RegTree,
    ) {
        let num_nodes = tree.num_nodes();
        self.snode.resize(num_nodes, NodeEntry::default());

        let rowset = matrix.buffered_rowset();
        let chunk = rowset.len().div_ceil(self.nthread).max(1);
        let position = &self.position;
        // Per-chunk partial sums, reduced serially in chunk order so the f64
        // accumulation is reproducible for a fixed thread count.
        let partials: Vec<Vec<GradStats>> = rowset
            .par_chunks(chunk)
            .map(|rows| {
                let mut acc = vec![GradStats::default(); num_nodes];
                for &ridx in rows {
                    if let Some(nid) = position.active_node(ridx as usize) {
                        acc[nid].add_pair(gpair[ridx as usize]);
                    }
                }
                acc
            })
            .collect();

        for &nid in qexpand {
            let mut stats = GradStats::default();
            for part in &partials {
                stats.add(&part[nid]);
            }
            self.snode[nid].stats = stats;
        }
        for &nid in qexpand {
            let parent = tree.parent(nid);
            let stats = self.snode[nid].stats;
            let weight = self.spliteval.compute_weight(parent, &stats);
            let root_gain = self.spliteval.compute_score(parent, &stats, weight);
            let entry = &mut self.snode[nid];
            entry.weight = weight as f32;
            entry.root_gain = root_gain as f32;
        }
    }

    fn update_queue_expand(qexpand: &[usize], tree: &RegTree) -> Vec<usize> {
        let mut new_nodes = Vec::new();
        for &nid in qexpand {
            if !tree.is_leaf(nid) {
                new_nodes.push(tree.left_child(nid));
                new_nodes.push(tree.right_child(nid));
            }
        }
        new_nodes
    }

    /// Enumerate splits for every pending node and commit the winners.
    fn find_split(
        &mut self,
        depth: u32,
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        tree: &mut RegTree,
    ) {
        let mut feat_set = self.feat_index.clone();
        if self.param.colsample_bylevel != 1.0 {
            feat_set.shuffle(&mut self.rng);
            let keep =
                ((self.param.colsample_bylevel * self.feat_index.len() as f32) as usize).max(1);
            feat_set.truncate(keep);
        }

        let num_nodes = tree.num_nodes();
        let poption = match self.param.parallel_option {
            ParallelOption::Auto => {
                if 2 * feat_set.len() >= self.nthread {
                    ParallelOption::Feature
                } else {
                    ParallelOption::Row
                }
            }
            other => other,
        };

        let scratches: Vec<Vec<ThreadEntry>> = {
            let ctx = EnumContext {
                param: &self.param,
                spliteval: self.spliteval.as_ref(),
                snode: &self.snode,
                position: &self.position,
                qexpand: &self.qexpand,
                gpair,
            };
            match poption {
                ParallelOption::Feature | ParallelOption::Auto => feat_set
                    .par_iter()
                    .fold(
                        || new_arena(num_nodes),
                        |mut temp, &fid| {
                            let col = matrix.col(fid);
                            if !col.is_empty() {
                                let indicator =
                                    col[0].fvalue == col[col.len() - 1].fvalue;
                                let density = matrix.col_density(fid);
                                if ctx.param.need_forward_search(density, indicator) {
                                    enumerate_split(
                                        &ctx,
                                        col,
                                        ScanDirection::Forward,
                                        fid,
                                        &mut temp,
                                    );
                                }
                                if ctx.param.need_backward_search(density, indicator) {
                                    enumerate_split(
                                        &ctx,
                                        col,
                                        ScanDirection::Backward,
                                        fid,
                                        &mut temp,
                                    );
                                }
                            }
                            temp
                        },
                    )
                    .collect(),
                ParallelOption::Row => {
                    let mut all = Vec::new();
                    for &fid in &feat_set {
                        let col = matrix.col(fid);
                        if col.is_empty() {
                            continue;
                        }
                        all.extend(parallel_find_split(
                            &ctx,
                            col,
                            fid,
                            matrix.col_density(fid),
                            self.nthread,
                            num_nodes,
                        ));
                    }
                    all
                }
            }
        };

        self.sync_best_solution(&scratches);

        let mut n_split = 0;
        for i in 0..self.qexpand.len() {
            let nid = self.qexpand[i];
            let best = self.snode[nid].best;
            if best.loss_chg > RT_EPS {
                tree.add_children(nid);
                tree.set_split(nid, best.split_index, best.split_value, best.default_left);
                self.logger
                    .node_split(nid, best.split_index, best.split_value, best.loss_chg);
                n_split += 1;
            } else {
                tree.set_leaf(nid, self.snode[nid].weight * self.param.learning_rate);
            }
        }
        self.logger.level(depth, self.qexpand.len(), n_split);
    }

    /// Merge every arena's candidates into the per-node bests, then reduce
    /// across workers when a collective is attached.
    fn sync_best_solution(&mut self, scratches: &[Vec<ThreadEntry>]) {
        for &nid in &self.qexpand {
            for temp in scratches {
                self.snode[nid].best.update_entry(&temp[nid].best);
            }
        }
        if let Some(collective) = &self.collective {
            let mut packed: Vec<SplitEntry> =
                self.qexpand.iter().map(|&nid| self.snode[nid].best).collect();
            collective.allreduce_splits(&mut packed);
            for (best, &nid) in packed.iter().zip(self.qexpand.iter()) {
                self.snode[nid].best = *best;
            }
        }
    }

    /// Route every row to its child after a level of splits.
    fn reset_position(&mut self, matrix: &ColMatrix, tree: &RegTree) -> Result<(), TrainError> {
        self.set_non_default_position(matrix, tree)?;

        // Everything untouched by a split column goes to its node's default
        // child; rows resting at a retired leaf stop participating.
        self.position.par_route(|_ridx, nid| {
            if tree.is_leaf(nid) {
                if tree.is_fresh_leaf(nid) {
                    RowRoute::Stay
                } else {
                    RowRoute::Retire(nid)
                }
            } else {
                RowRoute::MoveTo(tree.default_child(nid))
            }
        });
        Ok(())
    }

    /// Distinct features used by this level's splits, ascending.
    fn split_features(&self, tree: &RegTree, num_col: usize) -> Vec<u32> {
        let mut fsplits: Vec<u32> = self
            .qexpand
            .iter()
            .filter(|&&nid| !tree.is_leaf(nid))
            .map(|&nid| tree.split_index(nid))
            .filter(|&fid| (fid as usize) < num_col)
            .collect();
        fsplits.sort_unstable();
        fsplits.dedup();
        fsplits
    }

    /// Move rows that carry a split feature to the child its value selects.
    fn set_non_default_position(
        &mut self,
        matrix: &ColMatrix,
        tree: &RegTree,
    ) -> Result<(), TrainError> {
        if self.collective.is_some() {
            return self.set_non_default_position_dist(matrix, tree);
        }
        for fid in self.split_features(tree, matrix.num_col()) {
            let position = &self.position;
            let decisions: Vec<(usize, usize)> = matrix
                .col(fid)
                .par_iter()
                .filter_map(|entry| {
                    let ridx = entry.index as usize;
                    let nid = position.decode(ridx);
                    if !tree.is_leaf(nid) && tree.split_index(nid) == fid {
                        let child = if entry.fvalue < tree.split_cond(nid) {
                            tree.left_child(nid)
                        } else {
                            tree.right_child(nid)
                        };
                        Some((ridx, child))
                    } else {
                        None
                    }
                })
                .collect();
            for (ridx, child) in decisions {
                self.position.set_encode(ridx, child);
            }
        }
        Ok(())
    }

    /// Distributed variant: each worker flags the rows whose local columns
    /// prove a non-default route, the flags are OR-reduced, and every worker
    /// applies the combined routing. A flagged row sitting at a leaf means
    /// the workers committed different splits, which is fatal.
    fn set_non_default_position_dist(
        &mut self,
        matrix: &ColMatrix,
        tree: &RegTree,
    ) -> Result<(), TrainError> {
        let collective = self.collective.as_ref().expect("checked by caller").clone();

        let mut deviates = vec![false; self.position.len()];
        for fid in self.split_features(tree, matrix.num_col()) {
            let position = &self.position;
            let flagged: Vec<usize> = matrix
                .col(fid)
                .par_iter()
                .filter_map(|entry| {
                    let ridx = entry.index as usize;
                    let nid = position.decode(ridx);
                    if !tree.is_leaf(nid) && tree.split_index(nid) == fid {
                        let goes_left = entry.fvalue < tree.split_cond(nid);
                        if goes_left != tree.default_left(nid) {
                            return Some(ridx);
                        }
                    }
                    None
                })
                .collect();
            for ridx in flagged {
                deviates[ridx] = true;
            }
        }

        let mut bitmap = BitMap::from_bools(&deviates);
        collective.allreduce_bitor(bitmap.words_mut());

        for &ridx in matrix.buffered_rowset() {
            let ridx = ridx as usize;
            if !bitmap.get(ridx) {
                continue;
            }
            let nid = self.position.decode(ridx);
            if tree.is_leaf(nid) {
                return Err(TrainError::InconsistentReduce { row: ridx, nid });
            }
            let child = if tree.default_left(nid) {
                tree.right_child(nid)
            } else {
                tree.left_child(nid)
            };
            self.position.set_encode(ridx, child);
        }
        Ok(())
    }
}
