//! spec.md §4.1 — `RangeSolver<T>`: a single contiguous inclusive interval.

use std::fmt;

use rand::RngCore;

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::solver::domain::DomainInt;

/// Represents a single contiguous inclusive interval `[min..max]` of an
/// integer domain `T`. Many scalar fields (gas, gas refund, stack size,
/// block number, revision) are one-dimensional range problems; centralizing
/// the logic here lets constraints be composed by repeated tightening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSolver<T: DomainInt> {
    min: T,
    max: T,
}

impl<T: DomainInt> RangeSolver<T> {
    /// A solver initialized to the whole representable domain of `T`.
    pub fn full() -> Self {
        Self { min: T::MIN, max: T::MAX }
    }

    /// A solver initialized to exactly `[min..max]`.
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> T {
        self.min
    }

    pub fn max(&self) -> T {
        self.max
    }

    /// Tighten `min` to `max(min, v)`.
    pub fn add_lower_boundary(&mut self, v: T) {
        if v > self.min {
            self.min = v;
        }
    }

    /// Tighten `max` to `min(max, v)`.
    pub fn add_upper_boundary(&mut self, v: T) {
        if v < self.max {
            self.max = v;
        }
    }

    /// Tighten the domain to exactly `{v}`.
    pub fn add_equality_constraint(&mut self, v: T) {
        self.add_lower_boundary(v);
        self.add_upper_boundary(v);
    }

    pub fn is_satisfiable(&self) -> bool {
        self.min <= self.max
    }

    /// Sample a uniform value from `[min..max]`, or
    /// [`GenerateError::Unsatisfiable`] if the domain is empty.
    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<T, GenerateError> {
        if !self.is_satisfiable() {
            return Err(UnsatisfiableReason::empty_domain(
                "range",
                format!("{self} has no values (min > max)"),
            )
            .into());
        }
        Ok(T::sample_range(rng, self.min, self.max))
    }

    /// Value-copy clone, as required by spec.md §3 ("Clone copies them by
    /// value").
    pub fn clone_store(&self) -> Self {
        *self
    }

    /// Replace `self`'s state with `other`'s.
    pub fn restore(&mut self, other: &Self) {
        *self = *other;
    }
}

/// An unconstrained solver, i.e. [`RangeSolver::full`]. Lets sub-generators
/// that hold a `RangeSolver<T>` field derive `Default` instead of writing
/// it by hand.
impl<T: DomainInt> Default for RangeSolver<T> {
    fn default() -> Self {
        Self::full()
    }
}

impl<T: DomainInt> fmt::Display for RangeSolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}≤X≤{}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn tightening_narrows_domain() {
        let mut s: RangeSolver<u64> = RangeSolver::full();
        s.add_lower_boundary(10);
        s.add_upper_boundary(20);
        assert!(s.is_satisfiable());
        assert_eq!(s.to_string(), "10≤X≤20");
    }

    #[test]
    fn conflicting_bounds_unsatisfiable() {
        let mut s: RangeSolver<u64> = RangeSolver::full();
        s.add_lower_boundary(20);
        s.add_upper_boundary(10);
        assert!(!s.is_satisfiable());
        let mut rng = StdRng::seed_from_u64(1);
        assert!(s.generate(&mut rng).is_err());
    }

    #[test]
    fn equality_pins_single_value() {
        let mut s: RangeSolver<u64> = RangeSolver::full();
        s.add_equality_constraint(42);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(s.generate(&mut rng).unwrap(), 42);
    }

    #[test]
    fn restore_is_idempotent() {
        let mut a: RangeSolver<u64> = RangeSolver::new(0, 100);
        let snapshot = a.clone_store();
        a.add_lower_boundary(50);
        a.restore(&snapshot);
        assert_eq!(a.to_string(), snapshot.to_string());
    }
}
