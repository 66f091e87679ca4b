//! Row-parallel split enumeration within a single feature.
//!
//! Used when features are scarce relative to threads: one feature's column is
//! cut into per-thread chunks and every chunk is scanned concurrently. Four
//! phases:
//!
//! 1. each chunk accumulates its per-node statistics and records the first
//!    and last value it saw,
//! 2. a serial pass turns each chunk's statistics into an exclusive prefix
//!    sum (chunk `t` ends up holding the sum of chunks `< t`) and swaps the
//!    boundary values between neighbours so both sides know the cut,
//! 3. chunk boundaries whose values differ propose a midpoint candidate,
//! 4. a second parallel pass rescans each chunk for interior candidates,
//!    continuing on top of the exclusive prefix from phase 2.
//!
//! This is the classical exact enumerator: it does not model the `eps`
//! adversary. Robust training routes every feature through the sequential
//! scan instead (see the scheduling logic in the builder).

use rayon::prelude::*;

use crate::data::ColEntry;
use crate::training::gradients::GradStats;
use crate::training::scratch::{new_arena, EnumContext, ThreadEntry};
use crate::training::RT_EPS;

/// Scan one column with `nthread` chunks; returns one scratch arena per
/// chunk with per-node bests filled in, ready for the caller's merge.
pub fn parallel_find_split(
    ctx: &EnumContext<'_>,
    col: &[ColEntry],
    fid: u32,
    col_density: f32,
    nthread: usize,
    num_nodes: usize,
) -> Vec<Vec<ThreadEntry>> {
    let len = col.len();
    if len == 0 {
        return Vec::new();
    }
    let indicator = col[0].fvalue == col[len - 1].fvalue;
    let need_forward = ctx.param.need_forward_search(col_density, indicator);
    let need_backward = ctx.param.need_backward_search(col_density, indicator);

    let nthread = nthread.max(1);
    let step = len.div_ceil(nthread);
    let chunks: Vec<&[ColEntry]> = col.chunks(step).collect();
    let nchunk = chunks.len();

    // Phase 1: per-chunk accumulation.
    let mut stemp: Vec<Vec<ThreadEntry>> = chunks
        .par_iter()
        .map(|chunk| {
            let mut temp = new_arena(num_nodes);
            for entry in *chunk {
                let Some(nid) = ctx.position.active_node(entry.index as usize) else {
                    continue;
                };
                let e = &mut temp[nid];
                if e.stats.empty() {
                    e.first_fvalue = entry.fvalue;
                }
                e.stats.add_pair(ctx.gpair[entry.index as usize]);
                e.last_fvalue = entry.fvalue;
            }
            temp
        })
        .collect();

    // Phases 2 and 3, serial per node.
    for &nid in ctx.qexpand {
        // Exclusive prefix over chunks; neighbours swap boundary values so
        // each chunk sees the value just across its cut on either side.
        let mut sum = GradStats::default();
        for tid in 0..nchunk {
            let tmp = stemp[tid][nid].stats;
            stemp[tid][nid].stats = sum;
            sum.add(&tmp);
            if tid != 0 {
                let (lo, hi) = stemp.split_at_mut(tid);
                std::mem::swap(
                    &mut lo[tid - 1][nid].last_fvalue,
                    &mut hi[0][nid].first_fvalue,
                );
            }
        }

        let total = ctx.snode[nid].stats;
        let root_gain = ctx.snode[nid].root_gain;
        let mcw = ctx.param.min_child_weight;
        let mut c = GradStats::default();
        let mut tmp = GradStats::default();

        // Boundary candidates between chunks.
        for tid in 0..nchunk {
            stemp[tid][nid].stats_extra = sum;
            let prev_last = if tid != 0 {
                Some(stemp[tid - 1][nid].last_fvalue)
            } else {
                None
            };
            let e = &mut stemp[tid][nid];
            let fsplit = match prev_last {
                Some(prev) => {
                    if prev != e.first_fvalue {
                        0.5 * (prev + e.first_fvalue)
                    } else {
                        continue;
                    }
                }
                None => e.first_fvalue - RT_EPS,
            };
            if need_forward && tid != 0 {
                c.set_difference(&total, &e.stats);
                if c.sum_hess >= mcw && e.stats.sum_hess >= mcw {
                    let loss_chg = (ctx.spliteval.compute_split_score(nid, fid, &e.stats, &c)
                        - root_gain as f64) as f32;
                    e.best.update(loss_chg, fid, fsplit, false);
                }
            }
            if need_backward {
                tmp.set_difference(&sum, &e.stats);
                c.set_difference(&total, &tmp);
                if c.sum_hess >= mcw && tmp.sum_hess >= mcw {
                    let loss_chg = (ctx.spliteval.compute_split_score(nid, fid, &tmp, &c)
                        - root_gain as f64) as f32;
                    e.best.update(loss_chg, fid, fsplit, true);
                }
            }
        }

        // Everything-left candidate just past the column.
        if need_backward {
            tmp = sum;
            c.set_difference(&total, &tmp);
            let e = &mut stemp[nchunk - 1][nid];
            if c.sum_hess >= mcw && tmp.sum_hess >= mcw {
                let loss_chg = (ctx.spliteval.compute_split_score(nid, fid, &tmp, &c)
                    - root_gain as f64) as f32;
                e.best.update(loss_chg, fid, e.last_fvalue + RT_EPS, true);
            }
        }
    }

    // Phase 4: rescan interior candidates per chunk. Each chunk continues
    // accumulating on top of its exclusive prefix; `first_fvalue` now tracks
    // the previously seen value (seeded with the neighbour's boundary value
    // by the phase-2 swap).
    stemp
        .par_iter_mut()
        .zip(chunks.par_iter())
        .for_each(|(temp, chunk)| {
            let mcw = ctx.param.min_child_weight;
            let mut c = GradStats::default();
            let mut cright = GradStats::default();
            for entry in *chunk {
                let Some(nid) = ctx.position.active_node(entry.index as usize) else {
                    continue;
                };
                let fvalue = entry.fvalue;
                let total = ctx.snode[nid].stats;
                let root_gain = ctx.snode[nid].root_gain;
                let e = &mut temp[nid];
                if e.stats.empty() {
                    e.stats.add_pair(ctx.gpair[entry.index as usize]);
                    e.first_fvalue = fvalue;
                    continue;
                }
                if fvalue != e.first_fvalue {
                    let fsplit = 0.5 * (fvalue + e.first_fvalue);
                    if need_forward {
                        c.set_difference(&total, &e.stats);
                        if c.sum_hess >= mcw && e.stats.sum_hess >= mcw {
                            let loss_chg = (ctx
                                .spliteval
                                .compute_split_score(nid, fid, &e.stats, &c)
                                - root_gain as f64)
                                as f32;
                            e.best.update(loss_chg, fid, fsplit, false);
                        }
                    }
                    if need_backward {
                        cright.set_difference(&e.stats_extra, &e.stats);
                        c.set_difference(&total, &cright);
                        if c.sum_hess >= mcw && cright.sum_hess >= mcw {
                            let loss_chg = (ctx
                                .spliteval
                                .compute_split_score(nid, fid, &c, &cright)
                                - root_gain as f64)
                                as f32;
                            e.best.update(loss_chg, fid, fsplit, true);
                        }
                    }
                }
                e.stats.add_pair(ctx.gpair[entry.index as usize]);
                e.first_fvalue = fvalue;
            }
        });

    stemp
}
