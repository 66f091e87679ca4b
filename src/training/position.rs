//! Row-to-node position bookkeeping.
//!
//! Every row carries one `i32`: a non-negative value `nid` means the row sits
//! at node `nid` and participates in statistics, a negative value means the
//! row sits at node `!value` but is inactive (negative hessian, dropped by
//! subsampling, or resting at a retired leaf). The sign trick keeps the
//! active flag and the node id in one word; the methods here are the only
//! code that reads or writes the encoding.

use rayon::prelude::*;

/// Encoded row positions for one tree build.
#[derive(Debug, Default, Clone)]
pub struct PositionMap {
    pos: Vec<i32>,
}

impl PositionMap {
    /// Reset to `len` rows, all active at node 0.
    pub fn reset(&mut self, len: usize) {
        self.pos.clear();
        self.pos.resize(len, 0);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Node the row sits at, ignoring the active flag.
    #[inline]
    pub fn decode(&self, ridx: usize) -> usize {
        let pid = self.pos[ridx];
        if pid < 0 {
            !pid as usize
        } else {
            pid as usize
        }
    }

    /// Node the row sits at, or `None` if the row is inactive.
    #[inline]
    pub fn active_node(&self, ridx: usize) -> Option<usize> {
        let pid = self.pos[ridx];
        if pid < 0 {
            None
        } else {
            Some(pid as usize)
        }
    }

    /// Move the row to `nid`, preserving its active flag.
    #[inline]
    pub fn set_encode(&mut self, ridx: usize, nid: usize) {
        if self.pos[ridx] < 0 {
            self.pos[ridx] = !(nid as i32);
        } else {
            self.pos[ridx] = nid as i32;
        }
    }

    /// Place the row at its root, active.
    #[inline]
    pub fn set_root(&mut self, ridx: usize, root: usize) {
        self.pos[ridx] = root as i32;
    }

    /// Flip the row inactive; keeps the node it sits at.
    #[inline]
    pub fn deactivate(&mut self, ridx: usize) {
        if self.pos[ridx] >= 0 {
            self.pos[ridx] = !self.pos[ridx];
        }
    }

    /// Park the row inactive at `nid` (retired leaf).
    #[inline]
    pub fn retire(&mut self, ridx: usize, nid: usize) {
        self.pos[ridx] = !(nid as i32);
    }

    /// Force the row active at `nid`, discarding the inactive flag.
    #[inline]
    pub fn reactivate_at(&mut self, ridx: usize, nid: usize) {
        self.pos[ridx] = nid as i32;
    }

    #[inline]
    pub fn raw(&self) -> &[i32] {
        &self.pos
    }

    /// Re-route every row in parallel. `f` sees the row index and its decoded
    /// node and picks a [`RowRoute`]; the encoding stays in here.
    pub fn par_route<F>(&mut self, f: F)
    where
        F: Fn(usize, usize) -> RowRoute + Sync,
    {
        self.pos.par_iter_mut().enumerate().for_each(|(ridx, p)| {
            let nid = if *p < 0 { !*p as usize } else { *p as usize };
            match f(ridx, nid) {
                RowRoute::Stay => {}
                RowRoute::MoveTo(next) => {
                    if *p < 0 {
                        *p = !(next as i32);
                    } else {
                        *p = next as i32;
                    }
                }
                RowRoute::Retire(next) => *p = !(next as i32),
            }
        });
    }
}

/// Outcome of re-routing one row after a level of splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRoute {
    /// Keep the current position.
    Stay,
    /// Move to the node, preserving the active flag.
    MoveTo(usize),
    /// Park inactive at the node.
    Retire(usize),
}
