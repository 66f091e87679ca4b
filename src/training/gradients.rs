//! Gradient pairs and running gradient statistics.
//!
//! A [`GradientPair`] carries the first and second derivative of the loss for
//! one example at the current boosting iteration. A negative hessian marks the
//! example as inactive: it is skipped by statistics collection and split
//! enumeration for the rest of the tree.
//!
//! [`GradStats`] accumulates pairs into `f64` sums. Storage stays `f32` on the
//! example side for memory, while all gain and Newton-step arithmetic runs on
//! the accumulated `f64` values to reduce drift.

/// First and second loss derivatives for one example.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradientPair {
    grad: f32,
    hess: f32,
}

impl GradientPair {
    #[inline]
    pub fn new(grad: f32, hess: f32) -> Self {
        Self { grad, hess }
    }

    #[inline]
    pub fn grad(&self) -> f32 {
        self.grad
    }

    #[inline]
    pub fn hess(&self) -> f32 {
        self.hess
    }
}

/// Running sums of gradients and hessians over a set of examples.
///
/// Supports add, subtract, set-difference and disjoint union. Emptiness is
/// defined on the hessian sum alone, matching the convention that an example
/// with zero hessian carries no weight.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradStats {
    pub sum_grad: f64,
    pub sum_hess: f64,
}

impl GradStats {
    #[inline]
    pub fn new(sum_grad: f64, sum_hess: f64) -> Self {
        Self { sum_grad, sum_hess }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.sum_grad = 0.0;
        self.sum_hess = 0.0;
    }

    #[inline]
    pub fn empty(&self) -> bool {
        self.sum_hess == 0.0
    }

    #[inline]
    pub fn add_pair(&mut self, p: GradientPair) {
        self.sum_grad += p.grad() as f64;
        self.sum_hess += p.hess() as f64;
    }

    #[inline]
    pub fn sub_pair(&mut self, p: GradientPair) {
        self.sum_grad -= p.grad() as f64;
        self.sum_hess -= p.hess() as f64;
    }

    #[inline]
    pub fn add(&mut self, other: &GradStats) {
        self.sum_grad += other.sum_grad;
        self.sum_hess += other.sum_hess;
    }

    /// `self = a - b`, where `b` sums a subset of the examples summed by `a`.
    #[inline]
    pub fn set_difference(&mut self, a: &GradStats, b: &GradStats) {
        self.sum_grad = a.sum_grad - b.sum_grad;
        self.sum_hess = a.sum_hess - b.sum_hess;
    }

    /// `self = a + b`, where `a` and `b` sum disjoint example sets.
    #[inline]
    pub fn set_union(&mut self, a: &GradStats, b: &GradStats) {
        self.sum_grad = a.sum_grad + b.sum_grad;
        self.sum_hess = a.sum_hess + b.sum_hess;
    }

    #[inline]
    pub fn difference(a: &GradStats, b: &GradStats) -> GradStats {
        let mut out = GradStats::default();
        out.set_difference(a, b);
        out
    }

    #[inline]
    pub fn union(a: &GradStats, b: &GradStats) -> GradStats {
        let mut out = GradStats::default();
        out.set_union(a, b);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_subtract_pairs() {
        let mut s = GradStats::default();
        assert!(s.empty());

        s.add_pair(GradientPair::new(1.0, 2.0));
        s.add_pair(GradientPair::new(-0.5, 1.0));
        assert_eq!(s.sum_grad, 0.5);
        assert_eq!(s.sum_hess, 3.0);
        assert!(!s.empty());

        s.sub_pair(GradientPair::new(-0.5, 1.0));
        assert_eq!(s.sum_grad, 1.0);
        assert_eq!(s.sum_hess, 2.0);
    }

    #[test]
    fn difference_undoes_union() {
        let a = GradStats::new(3.0, 4.0);
        let b = GradStats::new(-1.0, 2.0);

        let u = GradStats::union(&a, &b);
        assert_eq!(u, GradStats::new(2.0, 6.0));

        let d = GradStats::difference(&u, &b);
        assert_eq!(d, a);
    }

    #[test]
    fn empty_tracks_hessian_only() {
        let s = GradStats::new(5.0, 0.0);
        assert!(s.empty());
    }
}
