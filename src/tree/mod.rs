//! Regression tree representation mutated in place by the growers.
//!
//! Children are `i32` indices with `-1` for "none". A leaf is a node without
//! a left child; its right-child slot doubles as a freshness marker: `0` for
//! a fresh leaf (just created by a split, may still be expanded next level)
//! and `-1` for a retired leaf. Per-node training statistics live in a
//! parallel [`NodeStat`] array.

use crate::error::TrainError;

const NO_NODE: i32 = -1;
const FRESH_LEAF: i32 = 0;

#[derive(Debug, Clone)]
struct Node {
    parent: i32,
    cleft: i32,
    cright: i32,
    split_index: u32,
    split_cond: f32,
    default_left: bool,
    leaf_value: f32,
    deleted: bool,
}

impl Node {
    fn fresh_leaf(parent: i32) -> Self {
        Self {
            parent,
            cleft: NO_NODE,
            cright: FRESH_LEAF,
            split_index: 0,
            split_cond: 0.0,
            default_left: false,
            leaf_value: 0.0,
            deleted: false,
        }
    }
}

/// Auxiliary statistics recorded for every node of the finished tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStat {
    /// Loss change of the split taken at this node (0 for leaves).
    pub loss_chg: f32,
    /// Weight the node would get as a leaf.
    pub base_weight: f32,
    /// Hessian sum over the rows that reached the node.
    pub sum_hess: f32,
    /// Per-root leaf weight vector.
    pub leaf_vec: Vec<f32>,
}

/// A regression tree under construction.
#[derive(Debug, Clone)]
pub struct RegTree {
    nodes: Vec<Node>,
    stats: Vec<NodeStat>,
    num_roots: usize,
}

impl Default for RegTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegTree {
    /// Fresh single-root tree.
    pub fn new() -> Self {
        Self::with_roots(1)
    }

    /// Fresh tree with `num_roots` root nodes.
    pub fn with_roots(num_roots: usize) -> Self {
        assert!(num_roots >= 1, "a tree needs at least one root");
        Self {
            nodes: (0..num_roots).map(|_| Node::fresh_leaf(NO_NODE)).collect(),
            stats: vec![NodeStat::default(); num_roots],
            num_roots,
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn num_roots(&self) -> usize {
        self.num_roots
    }

    /// Error unless the tree is untouched since construction.
    pub fn check_fresh(&self) -> Result<(), TrainError> {
        if self.nodes.len() == self.num_roots {
            Ok(())
        } else {
            Err(TrainError::NotFreshTree {
                num_nodes: self.nodes.len(),
                num_roots: self.num_roots,
            })
        }
    }

    #[inline]
    pub fn parent(&self, nid: usize) -> Option<usize> {
        let p = self.nodes[nid].parent;
        if p < 0 {
            None
        } else {
            Some(p as usize)
        }
    }

    #[inline]
    pub fn left_child(&self, nid: usize) -> usize {
        self.nodes[nid].cleft as usize
    }

    #[inline]
    pub fn right_child(&self, nid: usize) -> usize {
        self.nodes[nid].cright as usize
    }

    #[inline]
    pub fn is_leaf(&self, nid: usize) -> bool {
        self.nodes[nid].cleft == NO_NODE
    }

    /// A leaf created by the previous level's split, still expandable.
    #[inline]
    pub fn is_fresh_leaf(&self, nid: usize) -> bool {
        self.nodes[nid].cleft == NO_NODE && self.nodes[nid].cright == FRESH_LEAF
    }

    #[inline]
    pub fn is_deleted(&self, nid: usize) -> bool {
        self.nodes[nid].deleted
    }

    #[inline]
    pub fn split_index(&self, nid: usize) -> u32 {
        self.nodes[nid].split_index
    }

    #[inline]
    pub fn split_cond(&self, nid: usize) -> f32 {
        self.nodes[nid].split_cond
    }

    #[inline]
    pub fn default_left(&self, nid: usize) -> bool {
        self.nodes[nid].default_left
    }

    /// Child a row missing the split feature is routed to.
    #[inline]
    pub fn default_child(&self, nid: usize) -> usize {
        if self.nodes[nid].default_left {
            self.left_child(nid)
        } else {
            self.right_child(nid)
        }
    }

    #[inline]
    pub fn leaf_value(&self, nid: usize) -> f32 {
        self.nodes[nid].leaf_value
    }

    /// Allocate two fresh-leaf children for `nid`; returns `(left, right)`.
    pub fn add_children(&mut self, nid: usize) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(Node::fresh_leaf(nid as i32));
        self.nodes.push(Node::fresh_leaf(nid as i32));
        self.stats.push(NodeStat::default());
        self.stats.push(NodeStat::default());
        self.nodes[nid].cleft = left as i32;
        self.nodes[nid].cright = right as i32;
        (left, right)
    }

    /// Turn `nid` into a split node; children must already exist.
    pub fn set_split(&mut self, nid: usize, fid: u32, cond: f32, default_left: bool) {
        debug_assert!(self.nodes[nid].cleft != NO_NODE);
        let node = &mut self.nodes[nid];
        node.split_index = fid;
        node.split_cond = cond;
        node.default_left = default_left;
    }

    /// Retire `nid` as a leaf with the given value.
    pub fn set_leaf(&mut self, nid: usize, value: f32) {
        let node = &mut self.nodes[nid];
        node.cleft = NO_NODE;
        node.cright = NO_NODE;
        node.leaf_value = value;
    }

    /// Mark `nid` deleted; rows resolving here re-route to the parent.
    /// Part of the pruner collaborator contract.
    pub fn delete_node(&mut self, nid: usize) {
        assert!(
            self.nodes[nid].parent != NO_NODE,
            "cannot delete a root node"
        );
        self.nodes[nid].deleted = true;
    }

    #[inline]
    pub fn stat(&self, nid: usize) -> &NodeStat {
        &self.stats[nid]
    }

    #[inline]
    pub fn stat_mut(&mut self, nid: usize) -> &mut NodeStat {
        &mut self.stats[nid]
    }

    /// Number of (non-deleted) leaves.
    pub fn num_leaves(&self) -> usize {
        (0..self.nodes.len())
            .filter(|&nid| self.is_leaf(nid) && !self.is_deleted(nid))
            .count()
    }

    /// Route a single dense row through the tree; missing values are NaN.
    /// Test and inspection helper, not a prediction path.
    pub fn resolve_leaf(&self, row: &[f32]) -> usize {
        let mut nid = 0;
        while !self.is_leaf(nid) {
            let v = row[self.split_index(nid) as usize];
            nid = if v.is_nan() {
                self.default_child(nid)
            } else if v < self.split_cond(nid) {
                self.left_child(nid)
            } else {
                self.right_child(nid)
            };
        }
        nid
    }
}
