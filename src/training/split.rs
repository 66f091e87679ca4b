//! Best split candidates and their monotone merge rule.
//!
//! Every thread-local scratch and every node carries a [`SplitEntry`]: the
//! best candidate found so far. Candidates flow upwards through
//! [`SplitEntry::update`] — within one scan, across threads, and across
//! workers in the distributed variant. The replace rule is a total order
//! (larger loss change wins, ties go to the smaller feature id, then the
//! smaller threshold), so merging is commutative and the final winner does
//! not depend on reduction order.

/// A candidate split for one node: loss improvement, feature, threshold and
/// the default direction for rows missing the feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitEntry {
    /// Loss change of taking this split over keeping the node whole.
    pub loss_chg: f32,
    /// Feature the split tests.
    pub split_index: u32,
    /// Threshold; rows with `fvalue < split_value` go left.
    pub split_value: f32,
    /// Side that rows missing the feature are routed to.
    pub default_left: bool,
}

impl Default for SplitEntry {
    fn default() -> Self {
        Self {
            loss_chg: 0.0,
            split_index: 0,
            split_value: 0.0,
            default_left: false,
        }
    }
}

impl SplitEntry {
    /// Whether a candidate `(loss_chg, split_index, split_value)` should
    /// replace the current entry.
    ///
    /// Strictly larger loss change always wins. On exact ties the smaller
    /// feature id wins, then the smaller threshold; a full tie keeps the
    /// current entry, so the first scan to propose a candidate also decides
    /// its default direction.
    #[inline]
    fn need_replace(&self, loss_chg: f32, split_index: u32, split_value: f32) -> bool {
        if loss_chg > self.loss_chg {
            return true;
        }
        if loss_chg == self.loss_chg {
            if split_index < self.split_index {
                return true;
            }
            if split_index == self.split_index && split_value < self.split_value {
                return true;
            }
        }
        false
    }

    /// Offer a candidate; returns whether it replaced the current best.
    #[inline]
    pub fn update(
        &mut self,
        loss_chg: f32,
        split_index: u32,
        split_value: f32,
        default_left: bool,
    ) -> bool {
        if self.need_replace(loss_chg, split_index, split_value) {
            self.loss_chg = loss_chg;
            self.split_index = split_index;
            self.split_value = split_value;
            self.default_left = default_left;
            true
        } else {
            false
        }
    }

    /// Merge another entry in; used for thread and worker reduction.
    #[inline]
    pub fn update_entry(&mut self, other: &SplitEntry) -> bool {
        self.update(
            other.loss_chg,
            other.split_index,
            other.split_value,
            other.default_left,
        )
    }

    /// Rewrite the threshold in place (mid-move pass).
    #[inline]
    pub fn set_split_value(&mut self, value: f32) {
        self.split_value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn larger_loss_wins() {
        let mut e = SplitEntry::default();
        assert!(e.update(1.0, 3, 0.5, false));
        assert!(!e.update(0.5, 1, 0.1, true));
        assert!(e.update(2.0, 7, 9.0, true));
        assert_eq!(e.split_index, 7);
        assert!(e.default_left);
    }

    #[test]
    fn ties_prefer_smaller_feature_then_threshold() {
        let mut e = SplitEntry::default();
        e.update(1.0, 3, 0.5, false);

        // Same loss, larger feature id: keep.
        assert!(!e.update(1.0, 4, 0.1, true));
        // Same loss, smaller feature id: replace.
        assert!(e.update(1.0, 2, 0.9, true));
        // Same loss and feature, smaller threshold: replace.
        assert!(e.update(1.0, 2, 0.4, false));
        // Full tie: keep the incumbent.
        assert!(!e.update(1.0, 2, 0.4, true));
        assert!(!e.default_left);
    }

    #[test]
    fn merge_is_commutative() {
        let a = SplitEntry {
            loss_chg: 1.5,
            split_index: 2,
            split_value: 0.25,
            default_left: true,
        };
        let b = SplitEntry {
            loss_chg: 1.5,
            split_index: 5,
            split_value: 0.75,
            default_left: false,
        };
        let c = SplitEntry {
            loss_chg: 0.5,
            split_index: 0,
            split_value: -1.0,
            default_left: false,
        };

        for perm in [[a, b, c], [c, b, a], [b, a, c], [c, a, b]] {
            let mut best = SplitEntry::default();
            for e in &perm {
                best.update_entry(e);
            }
            assert_eq!(best, a);
        }
    }

    #[test]
    fn nan_candidate_never_replaces() {
        let mut e = SplitEntry::default();
        e.update(1.0, 0, 0.5, false);
        assert!(!e.update(f32::NAN, 0, 0.1, true));
        assert_eq!(e.loss_chg, 1.0);
    }
}
