//! Robust per-feature split enumeration.
//!
//! One call scans a single feature's column for one direction and updates
//! each pending node's best candidate in the caller's scratch arena. The scan
//! always runs in ascending feature-value order ("`x < eta` goes left" only
//! makes sense that way); the direction merely decides which side the scanned
//! prefix counts as and which default the candidate carries.
//!
//! At a row with value `x` the candidate threshold is `eta = x - eps`. Rows
//! whose value falls in `[eta - eps, eta + eps)` can be pushed to either side
//! by an adversary perturbing values by at most `eps`, so in addition to the
//! nominal placement the scan scores three adversarial alternatives — every
//! uncertain row forced left, every uncertain row forced right, and the two
//! nominal sides swapped across the threshold — and keeps the minimum. The
//! uncertain window only ever slides right, so the rows inside it are
//! tracked by two deques with O(1) amortized work per row.

use crate::data::ColEntry;
use crate::training::gradients::{GradStats, GradientPair};
use crate::training::scratch::{EnumContext, ThreadEntry};
use crate::training::RT_EPS;

/// Which conceptual scan produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending scan; the accumulated prefix is the left child, rows missing
    /// the feature default right.
    Forward,
    /// Descending scan; argument order is swapped when scoring and missing
    /// rows default left.
    Backward,
}

impl ScanDirection {
    #[inline]
    pub fn defaults_left(self) -> bool {
        matches!(self, ScanDirection::Backward)
    }
}

/// Score a (left, right) partition in scan order and convert to loss change.
#[inline]
fn directed_loss(
    ctx: &EnumContext<'_>,
    nid: usize,
    fid: u32,
    dir: ScanDirection,
    left: &GradStats,
    right: &GradStats,
    root_gain: f32,
) -> f32 {
    let score = match dir {
        ScanDirection::Forward => ctx.spliteval.compute_split_score(nid, fid, left, right),
        ScanDirection::Backward => ctx.spliteval.compute_split_score(nid, fid, right, left),
    };
    (score - root_gain as f64) as f32
}

/// Append the current row to every running aggregate of its node.
#[inline]
fn push_row(e: &mut ThreadEntry, entry_idx: u32, fvalue: f32, gp: GradientPair) {
    e.stats.add_pair(gp);
    e.last_fvalue = fvalue;
    e.data_unc_right.push_back(entry_idx);
    e.data_unc.push_back(entry_idx);
    e.stats_unc_right.add_pair(gp);
    e.stats_unc.add_pair(gp);
}

/// Enumerate all thresholds of `fid` over `col`, updating per-node bests in
/// `temp`. `col` may be sorted ascending or descending; iteration is
/// normalized to ascending.
pub fn enumerate_split(
    ctx: &EnumContext<'_>,
    col: &[ColEntry],
    dir: ScanDirection,
    fid: u32,
    temp: &mut [ThreadEntry],
) {
    let n = col.len();
    if n == 0 {
        return;
    }
    for &nid in ctx.qexpand {
        temp[nid].clear_scan();
    }

    let eps = ctx.param.robust_eps;
    let mcw = ctx.param.min_child_weight;
    let ascending = col[0].fvalue <= col[n - 1].fvalue;
    let at = |k: usize| if ascending { k } else { n - 1 - k };

    let mut c = GradStats::default();
    for k in 0..n {
        let i = at(k);
        let entry = col[i];
        let Some(nid) = ctx.position.active_node(entry.index as usize) else {
            continue;
        };
        let fvalue = entry.fvalue;
        let eta = fvalue - eps;
        let gp = ctx.gpair[entry.index as usize];
        let e = &mut temp[nid];

        if e.stats.empty() {
            push_row(e, i as u32, fvalue, gp);
            continue;
        }

        // Rows that fell below eta are now certain-left.
        while let Some(&front) = e.data_unc_right.front() {
            let fe = col[front as usize];
            if fe.fvalue >= eta {
                break;
            }
            let fgp = ctx.gpair[fe.index as usize];
            e.stats_left.add_pair(fgp);
            e.stats_unc_right.sub_pair(fgp);
            e.data_unc_right.pop_front();
        }
        // Rows that fell below eta - eps left the uncertain window for good.
        while let Some(&front) = e.data_unc.front() {
            let fe = col[front as usize];
            if fe.fvalue >= eta - eps {
                break;
            }
            let fgp = ctx.gpair[fe.index as usize];
            e.data_unc.pop_front();
            e.stats_c_left.add_pair(fgp);
            e.c_left_counter += 1;
            e.stats_unc.sub_pair(fgp);
        }

        if fvalue != e.last_fvalue && e.stats.sum_hess >= mcw {
            c.set_difference(&ctx.snode[nid].stats, &e.stats_left);
            if c.sum_hess >= mcw {
                let root_gain = ctx.snode[nid].root_gain;
                let mut loss_chg = directed_loss(ctx, nid, fid, dir, &e.stats_left, &c, root_gain);

                if !e.data_unc.is_empty() {
                    let total = ctx.snode[nid].stats;

                    // Every uncertain row forced left.
                    let all_left = GradStats::union(&e.stats_c_left, &e.stats_unc);
                    let rest = GradStats::difference(&total, &all_left);
                    let put_left = directed_loss(ctx, nid, fid, dir, &all_left, &rest, root_gain);
                    if put_left < loss_chg {
                        loss_chg = put_left;
                    }

                    // Every uncertain row forced right.
                    let all_right = GradStats::difference(&total, &e.stats_c_left);
                    let put_right =
                        directed_loss(ctx, nid, fid, dir, &e.stats_c_left, &all_right, root_gain);
                    if put_right < loss_chg {
                        loss_chg = put_right;
                    }

                    // Nominal-right rows cross left, nominal-left rows cross right.
                    let swap_left = GradStats::union(&e.stats_c_left, &e.stats_unc_right);
                    let swap_right = GradStats::difference(&total, &swap_left);
                    let swapped =
                        directed_loss(ctx, nid, fid, dir, &swap_left, &swap_right, root_gain);
                    if swapped < loss_chg {
                        loss_chg = swapped;
                    }
                }

                e.best.update(loss_chg, fid, eta, dir.defaults_left());
            }
        }

        push_row(e, i as u32, fvalue, gp);
    }

    // Degenerate everything-left split past the last observed value. For a
    // negative last value the forward threshold still clears every
    // observation; keep the magnitude-based gap as is.
    for &nid in ctx.qexpand {
        let e = &mut temp[nid];
        c.set_difference(&ctx.snode[nid].stats, &e.stats);
        if e.stats.sum_hess >= mcw && c.sum_hess >= mcw {
            let loss_chg = directed_loss(
                ctx,
                nid,
                fid,
                dir,
                &e.stats,
                &c,
                ctx.snode[nid].root_gain,
            );
            let gap = e.last_fvalue.abs() + RT_EPS + eps;
            let delta = match dir {
                ScanDirection::Forward => gap,
                ScanDirection::Backward => -gap,
            };
            e.best.update(loss_chg, fid, e.last_fvalue + delta, dir.defaults_left());
        }
    }

    // Move each winning threshold to the midpoint of the two observed values
    // bracketing it, once per node.
    let mut last_seen: Vec<Option<f32>> = vec![None; temp.len()];
    let mut moved = vec![false; temp.len()];
    for k in 0..n {
        let i = at(k);
        let entry = col[i];
        let Some(nid) = ctx.position.active_node(entry.index as usize) else {
            continue;
        };
        let e = &mut temp[nid];
        if e.best.split_index != fid || moved[nid] {
            continue;
        }
        if let Some(prev) = last_seen[nid] {
            if prev < e.best.split_value && e.best.split_value <= entry.fvalue {
                e.best.set_split_value(0.5 * (entry.fvalue + prev));
                moved[nid] = true;
            }
        }
        last_seen[nid] = Some(entry.fvalue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::evaluator::{create_evaluator, SplitEvaluator};
    use crate::training::position::PositionMap;
    use crate::training::scratch::{new_arena, NodeEntry};
    use crate::training::TrainParam;
    use crate::GradientPair;
    use approx::assert_abs_diff_eq;

    struct Fixture {
        param: TrainParam,
        spliteval: Box<dyn SplitEvaluator>,
        snode: Vec<NodeEntry>,
        position: PositionMap,
        qexpand: Vec<usize>,
        gpair: Vec<GradientPair>,
    }

    impl Fixture {
        /// All rows active at a single root node.
        fn new(gpair: Vec<GradientPair>, param: TrainParam) -> Self {
            let spliteval = create_evaluator(&param.split_evaluator, &param).unwrap();
            let mut stats = crate::GradStats::default();
            for &gp in &gpair {
                stats.add_pair(gp);
            }
            let weight = spliteval.compute_weight(None, &stats);
            let root_gain = spliteval.compute_score(None, &stats, weight) as f32;
            let mut position = PositionMap::default();
            position.reset(gpair.len());
            Self {
                param,
                spliteval,
                snode: vec![NodeEntry {
                    stats,
                    root_gain,
                    weight: weight as f32,
                    ..Default::default()
                }],
                position,
                qexpand: vec![0],
                gpair,
            }
        }

        fn ctx(&self) -> EnumContext<'_> {
            EnumContext {
                param: &self.param,
                spliteval: self.spliteval.as_ref(),
                snode: &self.snode,
                position: &self.position,
                qexpand: &self.qexpand,
                gpair: &self.gpair,
            }
        }
    }

    fn column(values: &[f32]) -> Vec<ColEntry> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| ColEntry::new(i as u32, v))
            .collect()
    }

    fn six_point_fixture(eps: f32) -> Fixture {
        let gpair = vec![
            GradientPair::new(1.0, 1.0),
            GradientPair::new(1.0, 1.0),
            GradientPair::new(1.0, 1.0),
            GradientPair::new(-1.0, 1.0),
            GradientPair::new(-1.0, 1.0),
            GradientPair::new(-1.0, 1.0),
        ];
        let param = TrainParam {
            reg_lambda: 0.0,
            robust_eps: eps,
            ..Default::default()
        };
        Fixture::new(gpair, param)
    }

    #[test]
    fn clean_split_without_perturbation() {
        let fx = six_point_fixture(0.0);
        let col = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut temp = new_arena(1);

        enumerate_split(&fx.ctx(), &col, ScanDirection::Forward, 0, &mut temp);

        let best = temp[0].best;
        assert_abs_diff_eq!(best.loss_chg, 6.0, epsilon = 1e-5);
        assert_abs_diff_eq!(best.split_value, 3.5, epsilon = 1e-5);
        assert!(!best.default_left);
    }

    #[test]
    fn adversary_shrinks_the_gain() {
        let fx = six_point_fixture(0.5);
        let col = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut temp = new_arena(1);

        enumerate_split(&fx.ctx(), &col, ScanDirection::Forward, 0, &mut temp);

        // With eps = 0.5 the boundary rows can be pushed across any
        // threshold, so the worst case drops from 6.0 to 3.0.
        let best = temp[0].best;
        assert!(best.loss_chg < 6.0);
        assert_abs_diff_eq!(best.loss_chg, 3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(best.split_value, 3.5, epsilon = 1e-5);
    }

    #[test]
    fn robust_loss_never_exceeds_nominal() {
        let values = [0.5, 0.5, 1.0, 1.5, 2.0, 2.0, 2.5, 4.0];
        let grads = [1.0, -0.5, 1.0, 0.5, -1.0, 1.0, -1.5, -0.5];
        let gpair: Vec<GradientPair> = grads.iter().map(|&g| GradientPair::new(g, 1.0)).collect();

        let mut best_per_eps = Vec::new();
        for eps in [0.0f32, 0.25, 0.6] {
            let param = TrainParam {
                reg_lambda: 0.5,
                robust_eps: eps,
                ..Default::default()
            };
            let fx = Fixture::new(gpair.clone(), param);
            let mut temp = new_arena(1);
            enumerate_split(&fx.ctx(), &column(&values), ScanDirection::Forward, 0, &mut temp);
            best_per_eps.push(temp[0].best.loss_chg);
        }

        assert!(best_per_eps[1] <= best_per_eps[0] + 1e-6);
        assert!(best_per_eps[2] <= best_per_eps[0] + 1e-6);
    }

    #[test]
    fn direction_of_storage_does_not_matter() {
        let values = [0.5, 0.5, 1.0, 1.5, 2.0, 2.0, 2.5, 4.0];
        let grads = [1.0, -0.5, 1.0, 0.5, -1.0, 1.0, -1.5, -0.5];
        let gpair: Vec<GradientPair> = grads.iter().map(|&g| GradientPair::new(g, 1.0)).collect();
        let param = TrainParam {
            reg_lambda: 0.5,
            robust_eps: 0.3,
            ..Default::default()
        };

        let fx = Fixture::new(gpair, param);
        let col = column(&values);
        let mut reversed = col.clone();
        reversed.reverse();

        let mut temp_fwd = new_arena(1);
        let mut temp_rev = new_arena(1);
        enumerate_split(&fx.ctx(), &col, ScanDirection::Forward, 0, &mut temp_fwd);
        enumerate_split(&fx.ctx(), &reversed, ScanDirection::Forward, 0, &mut temp_rev);

        assert_eq!(temp_fwd[0].best, temp_rev[0].best);
    }

    #[test]
    fn repeated_enumeration_is_stable() {
        // The mid-move pass must be idempotent: a second scan re-proposes the
        // same candidates and must leave the moved threshold alone.
        let fx = six_point_fixture(0.5);
        let col = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut temp = new_arena(1);

        enumerate_split(&fx.ctx(), &col, ScanDirection::Forward, 0, &mut temp);
        let first = temp[0].best;
        enumerate_split(&fx.ctx(), &col, ScanDirection::Forward, 0, &mut temp);
        assert_eq!(temp[0].best, first);
    }

    #[test]
    fn backward_scan_defaults_left() {
        let fx = six_point_fixture(0.0);
        let col = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut temp = new_arena(1);

        enumerate_split(&fx.ctx(), &col, ScanDirection::Backward, 0, &mut temp);

        let best = temp[0].best;
        assert_abs_diff_eq!(best.loss_chg, 6.0, epsilon = 1e-5);
        assert!(best.default_left);
    }

    #[test]
    fn inactive_rows_are_invisible() {
        let mut fx = six_point_fixture(0.0);
        // Drop the row with value 2.0 and rebuild the root aggregate the way
        // the builder would.
        fx.position.deactivate(1);
        let mut stats = crate::GradStats::default();
        for (ridx, &gp) in fx.gpair.iter().enumerate() {
            if fx.position.active_node(ridx).is_some() {
                stats.add_pair(gp);
            }
        }
        let weight = fx.spliteval.compute_weight(None, &stats);
        fx.snode[0].stats = stats;
        fx.snode[0].root_gain = fx.spliteval.compute_score(None, &stats, weight) as f32;

        let col = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut temp = new_arena(1);
        enumerate_split(&fx.ctx(), &col, ScanDirection::Forward, 0, &mut temp);

        let best = temp[0].best;
        // Active rows are {1, 3} vs {4, 5, 6}; the bracketing values are
        // still 3 and 4.
        assert_abs_diff_eq!(best.split_value, 3.5, epsilon = 1e-5);
        assert_abs_diff_eq!(best.loss_chg, 4.8, epsilon = 1e-4);
        assert_eq!(temp[0].stats.sum_hess, 5.0);
    }

    /// Reference implementation: classify rows per candidate threshold
    /// directly instead of maintaining sliding queues.
    fn reference_best(values: &[f32], gpair: &[GradientPair], param: &TrainParam) -> (f32, f32) {
        let eps = param.robust_eps;
        let spliteval = create_evaluator(&param.split_evaluator, param).unwrap();
        let mut total = crate::GradStats::default();
        for &gp in gpair {
            total.add_pair(gp);
        }
        let weight = spliteval.compute_weight(None, &total);
        let root_gain = spliteval.compute_score(None, &total, weight);

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

        let mut best = crate::SplitEntry::default();
        for (pos, &i) in order.iter().enumerate() {
            if pos == 0 || values[i] == values[order[pos - 1]] {
                continue;
            }
            let eta = values[i] - eps;
            let mut seen = crate::GradStats::default();
            let mut left = crate::GradStats::default();
            let mut c_left = crate::GradStats::default();
            let mut unc = crate::GradStats::default();
            let mut unc_right = crate::GradStats::default();
            for &j in &order[..pos] {
                let v = values[j];
                seen.add_pair(gpair[j]);
                if v < eta {
                    left.add_pair(gpair[j]);
                }
                if v < eta - eps {
                    c_left.add_pair(gpair[j]);
                } else {
                    unc.add_pair(gpair[j]);
                    if v >= eta {
                        unc_right.add_pair(gpair[j]);
                    }
                }
            }
            if seen.sum_hess < param.min_child_weight {
                continue;
            }
            let c = crate::GradStats::difference(&total, &left);
            if c.sum_hess < param.min_child_weight {
                continue;
            }
            let score = |l: &crate::GradStats, r: &crate::GradStats| {
                (spliteval.compute_split_score(0, 0, l, r) - root_gain) as f32
            };
            let mut loss = score(&left, &c);
            if !unc.empty() {
                let al = crate::GradStats::union(&c_left, &unc);
                let v = score(&al, &crate::GradStats::difference(&total, &al));
                if v < loss {
                    loss = v;
                }
                let ar = crate::GradStats::difference(&total, &c_left);
                let v = score(&c_left, &ar);
                if v < loss {
                    loss = v;
                }
                let sw = crate::GradStats::union(&c_left, &unc_right);
                let v = score(&sw, &crate::GradStats::difference(&total, &sw));
                if v < loss {
                    loss = v;
                }
            }
            best.update(loss, 0, eta, false);
        }
        (best.loss_chg, best.split_value)
    }

    #[test]
    fn sliding_queues_match_direct_classification() {
        let values = [0.5, 0.5, 1.0, 1.5, 2.0, 2.0, 2.5, 3.0, 3.0, 4.5];
        let grads = [1.0, -0.5, 1.0, 0.5, -1.0, 1.0, -1.5, 0.25, -0.75, -0.5];
        let gpair: Vec<GradientPair> = grads.iter().map(|&g| GradientPair::new(g, 1.0)).collect();

        for eps in [0.1f32, 0.3, 0.75] {
            let param = TrainParam {
                reg_lambda: 1.0,
                robust_eps: eps,
                ..Default::default()
            };
            let fx = Fixture::new(gpair.clone(), param.clone());
            let mut temp = new_arena(1);
            enumerate_split(&fx.ctx(), &column(&values), ScanDirection::Forward, 0, &mut temp);

            let (ref_loss, _ref_eta) = reference_best(&values, &gpair, &param);
            // The scan also proposes the degenerate tail candidate and then
            // mid-moves, so compare the interior loss only.
            assert_abs_diff_eq!(temp[0].best.loss_chg, ref_loss, epsilon = 1e-5);
        }
    }
}
