//! spec.md §4.9 — `BlockContextGenerator`. The block-number domain couples
//! every other field here: revision is a function of block number, and
//! "offset" / "in the last 256 blocks" constraints on auxiliary variables
//! only resolve once the block number itself has been drawn.

use std::collections::BTreeMap;
use std::fmt;

use primitive_types::U256;
use rand::RngCore;

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{fork_block, random_u256, range_length, revision_for_block, Address, Hash, Revision};
use crate::solver::RangeSolver;
use crate::state::BlockContext;
use crate::variable::{Assignment, Variable};

/// An auxiliary variable bound relative to the block number.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Offset {
    /// `var = blockNumber - distance`, used for e.g. "a valid BLOCKHASH
    /// argument" constraints.
    Exact(u64),
    /// `var` must land within the last 256 blocks (`blockNumber - 256 <
    /// var < blockNumber`), exclusive of the current block itself.
    WithinLast256,
    /// `var` must land strictly outside the last 256 blocks window.
    OutsideLast256,
}

#[derive(Debug, Clone, Default)]
pub struct BlockContextGenerator {
    block_number: RangeSolver<u64>,
    revision_fixed: Option<Revision>,
    offsets: BTreeMap<Variable, Offset>,
    unsatisfiable: bool,
}

impl BlockContextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block_number_min(&mut self, min: u64) {
        self.block_number.add_lower_boundary(min);
    }

    pub fn add_block_number_max(&mut self, max: u64) {
        self.block_number.add_upper_boundary(max);
    }

    /// spec.md §4.9: pinning a revision restricts the block-number domain to
    /// that revision's active range (`[forkBlock(rev) .. forkBlock(rev) +
    /// rangeLength(rev) - 1]`); pinning two different revisions is an
    /// immediate conflict.
    pub fn set_revision(&mut self, rev: Revision) {
        match self.revision_fixed {
            Some(existing) if existing != rev => self.unsatisfiable = true,
            _ => {
                self.revision_fixed = Some(rev);
                let start = fork_block(rev);
                let len = range_length(rev);
                let end = start.saturating_add(len.saturating_sub(1));
                self.block_number.add_lower_boundary(start);
                self.block_number.add_upper_boundary(end);
            }
        }
    }

    pub fn bind_offset(&mut self, var: Variable, distance: u64) {
        self.set_offset(var, Offset::Exact(distance));
    }

    pub fn bind_within_last_256_blocks(&mut self, var: Variable) {
        self.set_offset(var, Offset::WithinLast256);
    }

    pub fn bind_outside_last_256_blocks(&mut self, var: Variable) {
        self.set_offset(var, Offset::OutsideLast256);
    }

    fn set_offset(&mut self, var: Variable, offset: Offset) {
        match self.offsets.get(&var) {
            Some(existing) if *existing != offset => self.unsatisfiable = true,
            _ => {
                self.offsets.insert(var, offset);
            }
        }
    }

    pub fn generate(&self, assignment: &mut Assignment, rng: &mut dyn RngCore) -> Result<BlockContext, GenerateError> {
        if self.unsatisfiable {
            return Err(UnsatisfiableReason::conflict("block_context", "conflicting revision or offset constraints").into());
        }

        // A pre-assigned offset variable constrains the block number before
        // it is drawn (spec.md §8 scenario 2: `a` pre-assigned to 100 with
        // `blockNumber - 44 = a` pins `blockNumber` to 144), rather than the
        // other way around. This holds for all three offset kinds, not just
        // `Exact`: a pre-assigned `WithinLast256`/`OutsideLast256` variable
        // pins the block-number domain to the window that makes the
        // pre-assigned value fall inside (or outside) the last 256 blocks.
        let mut block_number_solver = self.block_number;
        for (var, offset) in &self.offsets {
            if let Some(pre) = assignment.get(var) {
                let pre = pre.as_u64();
                match offset {
                    Offset::Exact(distance) => {
                        let required = pre.checked_add(*distance).ok_or_else(|| {
                            GenerateError::from(UnsatisfiableReason::out_of_range(
                                "block_context",
                                format!("{var} + {distance} overflows a block number"),
                            ))
                        })?;
                        block_number_solver.add_equality_constraint(required);
                    }
                    Offset::WithinLast256 => {
                        // blockNumber-256 <= pre <= blockNumber-1
                        let lo = pre.checked_add(1).ok_or_else(|| {
                            GenerateError::from(UnsatisfiableReason::out_of_range(
                                "block_context",
                                format!("{var} + 1 overflows a block number"),
                            ))
                        })?;
                        block_number_solver.add_lower_boundary(lo);
                        block_number_solver.add_upper_boundary(pre.saturating_add(256));
                    }
                    Offset::OutsideLast256 => {
                        // pre < blockNumber-256
                        let lo = pre.checked_add(257).ok_or_else(|| {
                            GenerateError::from(UnsatisfiableReason::out_of_range(
                                "block_context",
                                format!("{var} + 257 overflows a block number"),
                            ))
                        })?;
                        block_number_solver.add_lower_boundary(lo);
                    }
                }
            }
        }

        let block_number = block_number_solver.generate(rng)?;
        let revision = self.revision_fixed.unwrap_or_else(|| revision_for_block(block_number));

        for (var, offset) in &self.offsets {
            // A pre-assigned value is reused as-is; the tightening pass
            // above already guaranteed it is compatible with the drawn
            // block number, so drawing a fresh value here would conflict
            // with it almost always.
            let value = if let Some(pre) = assignment.get(var) {
                pre.as_u64()
            } else {
                match offset {
                    Offset::Exact(distance) => block_number.checked_sub(*distance).ok_or_else(|| {
                        GenerateError::from(UnsatisfiableReason::out_of_range(
                            "block_context",
                            format!("{var} = blockNumber - {distance} underflows at blockNumber {block_number}"),
                        ))
                    })?,
                    Offset::WithinLast256 => {
                        let lo = block_number.saturating_sub(256);
                        let hi = block_number.saturating_sub(1);
                        let mut solver = RangeSolver::new(lo, hi);
                        solver.generate(rng)?
                    }
                    Offset::OutsideLast256 => {
                        let boundary = block_number.saturating_sub(256);
                        if boundary == 0 {
                            return Err(UnsatisfiableReason::empty_domain(
                                "block_context",
                                format!("{var} has no values outside the last 256 blocks at blockNumber {block_number}"),
                            )
                            .into());
                        }
                        let mut solver = RangeSolver::new(0, boundary - 1);
                        solver.generate(rng)?
                    }
                }
            };
            if !assignment.bind(var.clone(), U256::from(value)) {
                return Err(UnsatisfiableReason::conflict("block_context", format!("{var} already bound")).into());
            }
        }

        Ok(BlockContext {
            block_number,
            revision,
            chain_id: 1,
            coinbase: Address::random(rng),
            gas_limit: 30_000_000,
            base_fee: random_u256(rng) % U256::from(1_000_000_000_000u64),
            blob_base_fee: random_u256(rng) % U256::from(1_000_000_000_000u64),
            gas_price: random_u256(rng) % U256::from(1_000_000_000_000u64),
            prev_randao: Hash::random(rng),
            timestamp: 1_700_000_000 + block_number.saturating_mul(12),
        })
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for BlockContextGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blockNumber: {}", self.block_number)?;
        if let Some(rev) = self.revision_fixed {
            write!(f, ",revision={rev}")?;
        }
        for (var, offset) in &self.offsets {
            match offset {
                Offset::Exact(d) => write!(f, ",{var}=blockNumber-{d}")?,
                Offset::WithinLast256 => write!(f, ",{var}∈last256blocks")?,
                Offset::OutsideLast256 => write!(f, ",{var}∉last256blocks")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn set_revision_pins_block_number_range() {
        let mut g = BlockContextGenerator::new();
        g.set_revision(Revision::Istanbul);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let ctx = g.generate(&mut a, &mut rng).unwrap();
            assert_eq!(ctx.revision, Revision::Istanbul);
            assert!(ctx.block_number < fork_block(Revision::Berlin));
        }
    }

    #[test]
    fn offset_binds_block_number_minus_distance() {
        let mut g = BlockContextGenerator::new();
        g.add_block_number_min(1_000);
        g.add_block_number_max(1_000);
        g.bind_offset(Variable::new("target"), 5);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(2);
        g.generate(&mut a, &mut rng).unwrap();
        assert_eq!(a.get(&Variable::new("target")), Some(U256::from(995u64)));
    }

    #[test]
    fn pre_assigned_offset_variable_pins_block_number() {
        let mut g = BlockContextGenerator::new();
        g.set_revision(Revision::Istanbul);
        g.bind_offset(Variable::new("a"), 44);
        let mut a = Assignment::new();
        assert!(a.bind(Variable::new("a"), U256::from(100u64)));
        let mut rng = StdRng::seed_from_u64(7);
        let ctx = g.generate(&mut a, &mut rng).unwrap();
        assert_eq!(ctx.block_number, 144);
        assert_eq!(ctx.revision, Revision::Istanbul);
    }

    #[test]
    fn pre_assigned_within_last_256_pins_block_number_window() {
        let mut g = BlockContextGenerator::new();
        g.bind_within_last_256_blocks(Variable::new("h"));
        let mut a = Assignment::new();
        assert!(a.bind(Variable::new("h"), U256::from(1_000u64)));
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let mut a = a.clone();
            let ctx = g.generate(&mut a, &mut rng).unwrap();
            assert!(ctx.block_number > 1_000);
            assert!(ctx.block_number <= 1_256);
            assert_eq!(a.get(&Variable::new("h")), Some(U256::from(1_000u64)));
        }
    }

    #[test]
    fn pre_assigned_outside_last_256_pins_block_number_lower_bound() {
        let mut g = BlockContextGenerator::new();
        g.bind_outside_last_256_blocks(Variable::new("h"));
        let mut a = Assignment::new();
        assert!(a.bind(Variable::new("h"), U256::from(1_000u64)));
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..20 {
            let mut a = a.clone();
            let ctx = g.generate(&mut a, &mut rng).unwrap();
            assert!(ctx.block_number > 1_256);
            assert_eq!(a.get(&Variable::new("h")), Some(U256::from(1_000u64)));
        }
    }

    #[test]
    fn conflicting_revisions_are_unsatisfiable() {
        let mut g = BlockContextGenerator::new();
        g.set_revision(Revision::Istanbul);
        g.set_revision(Revision::Cancun);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(g.generate(&mut a, &mut rng).is_err());
    }
}
