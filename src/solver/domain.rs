//! The numeric-domain abstraction `RangeSolver`/`IntervalSolver` share.

use primitive_types::U256;
use rand::RngCore;

/// An integer domain `RangeSolver`/`IntervalSolver` can work over.
///
/// Centralizes the "domain covers the whole representable range of `T` ⇒
/// sample by raw word read" special case spec.md §4.1/§4.2 calls for, and
/// the interval arithmetic (`succ`/`pred`) `IntervalSolver::Exclude` needs
/// to split a range without an off-by-one.
pub trait DomainInt: Copy + PartialOrd + Eq + std::fmt::Display + std::fmt::Debug {
    const MIN: Self;
    const MAX: Self;

    /// `v + 1`, or `None` if `v == MAX`.
    fn succ(self) -> Option<Self>;
    /// `v - 1`, or `None` if `v == MIN`.
    fn pred(self) -> Option<Self>;

    /// Uniformly sample from the inclusive range `[lo, hi]`. Callers
    /// guarantee `lo <= hi`.
    fn sample_range(rng: &mut dyn RngCore, lo: Self, hi: Self) -> Self;
}

macro_rules! impl_domain_int_unsigned {
    ($t:ty) => {
        impl DomainInt for $t {
            const MIN: Self = <$t>::MIN;
            const MAX: Self = <$t>::MAX;

            fn succ(self) -> Option<Self> {
                self.checked_add(1)
            }

            fn pred(self) -> Option<Self> {
                self.checked_sub(1)
            }

            fn sample_range(rng: &mut dyn RngCore, lo: Self, hi: Self) -> Self {
                if lo == Self::MIN && hi == Self::MAX {
                    return raw_word::<$t>(rng);
                }
                use rand::Rng;
                rng.gen_range(lo..=hi)
            }
        }
    };
}

fn raw_word<T>(rng: &mut dyn RngCore) -> T
where
    T: TryFrom<u128>,
{
    // All of our integer domains (u64, i128 treated via u128 bit pattern)
    // fit in a u128 raw read; callers only hit this path when the domain
    // is the type's whole representable range.
    let mut buf = [0u8; 16];
    rng.fill_bytes(&mut buf);
    let word = u128::from_le_bytes(buf);
    T::try_from(word).unwrap_or_else(|_| unreachable!("raw_word truncation"))
}

impl_domain_int_unsigned!(u64);

impl DomainInt for i128 {
    const MIN: Self = i128::MIN;
    const MAX: Self = i128::MAX;

    fn succ(self) -> Option<Self> {
        self.checked_add(1)
    }

    fn pred(self) -> Option<Self> {
        self.checked_sub(1)
    }

    fn sample_range(rng: &mut dyn RngCore, lo: Self, hi: Self) -> Self {
        if lo == Self::MIN && hi == Self::MAX {
            let mut buf = [0u8; 16];
            rng.fill_bytes(&mut buf);
            return i128::from_le_bytes(buf);
        }
        use rand::Rng;
        rng.gen_range(lo..=hi)
    }
}

impl DomainInt for U256 {
    const MIN: Self = U256::zero();
    const MAX: Self = U256::MAX;

    fn succ(self) -> Option<Self> {
        self.checked_add(U256::one())
    }

    fn pred(self) -> Option<Self> {
        if self.is_zero() {
            None
        } else {
            Some(self - U256::one())
        }
    }

    fn sample_range(rng: &mut dyn RngCore, lo: Self, hi: Self) -> Self {
        if lo == Self::MIN && hi == Self::MAX {
            return crate::evm::random_u256(rng);
        }
        // Rejection sampling: span = hi - lo is representable (hi >= lo and
        // not the full range, so span + 1 cannot overflow).
        let span_plus_one = hi - lo + U256::one();
        loop {
            let draw = crate::evm::random_u256(rng);
            if draw < span_plus_one {
                return lo + draw;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn u64_sample_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let v = u64::sample_range(&mut rng, 10, 20);
            assert!((10..=20).contains(&v));
        }
    }

    #[test]
    fn u256_sample_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let lo = U256::from(5u64);
        let hi = U256::from(9u64);
        for _ in 0..100 {
            let v = U256::sample_range(&mut rng, lo, hi);
            assert!(v >= lo && v <= hi);
        }
    }
}
