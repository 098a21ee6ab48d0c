//! spec.md §4.10c — `TransactionContextGenerator`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use primitive_types::U256;
use rand::{Rng, RngCore};

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{Address, Hash};
use crate::rand_util::fresh_value;
use crate::solver::RangeSolver;
use crate::state::TransactionContext;
use crate::variable::{Assignment, Variable};

/// Default number of blob hashes when no presence/absence constraint
/// narrows the list length.
const DEFAULT_MAX_BLOB_HASHES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Present,
    Absent,
}

/// spec.md §4.10c: blob hash presence/absence is tracked per `Variable`,
/// the same shape `AccountsGenerator` uses for empty/non-empty — the
/// variable resolves to a concrete list index, and presence/absence then
/// constrains how long the generated `blobHashes` list must be.
#[derive(Debug, Clone, Default)]
pub struct TransactionContextGenerator {
    origin: Option<Address>,
    gas_price: RangeSolver<U256>,
    blob_hash_presence: BTreeMap<Variable, Presence>,
    unsatisfiable: bool,
}

impl TransactionContextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_origin(&mut self, origin: Address) {
        self.origin = Some(origin);
    }

    pub fn add_gas_price_min(&mut self, min: U256) {
        self.gas_price.add_lower_boundary(min);
    }

    pub fn add_gas_price_max(&mut self, max: U256) {
        self.gas_price.add_upper_boundary(max);
    }

    /// `index_var` resolves to a blob hash index that must exist.
    pub fn require_blob_hash_present(&mut self, index_var: Variable) {
        self.bind_presence(index_var, Presence::Present);
    }

    /// `index_var` resolves to a blob hash index that must not exist (the
    /// generated list is shorter than that index).
    pub fn require_blob_hash_absent(&mut self, index_var: Variable) {
        self.bind_presence(index_var, Presence::Absent);
    }

    fn bind_presence(&mut self, var: Variable, p: Presence) {
        match self.blob_hash_presence.get(&var) {
            Some(&existing) if existing != p => self.unsatisfiable = true,
            _ => {
                self.blob_hash_presence.insert(var, p);
            }
        }
    }

    pub fn generate(&self, assignment: &mut Assignment, rng: &mut dyn RngCore) -> Result<TransactionContext, GenerateError> {
        if self.unsatisfiable {
            return Err(UnsatisfiableReason::conflict(
                "transaction_context",
                "a blob hash index was bound both present and absent",
            )
            .into());
        }

        let origin = self.origin.unwrap_or_else(|| Address::random(rng));
        let gas_price = self.gas_price.generate(rng)?;

        let mut used_indices: BTreeSet<usize> = BTreeSet::new();
        let mut present_indices: BTreeSet<usize> = BTreeSet::new();
        let mut absent_indices: BTreeSet<usize> = BTreeSet::new();

        for (var, presence) in &self.blob_hash_presence {
            let index = if let Some(v) = assignment.get(var) {
                if v > U256::from(u64::MAX) {
                    return Err(UnsatisfiableReason::out_of_range(
                        "transaction_context",
                        format!("{var} is bound to {v:#x} which does not fit a blob hash index"),
                    )
                    .into());
                }
                v.as_u64() as usize
            } else {
                fresh_value(
                    rng,
                    |rng| rng.gen_range(0..DEFAULT_MAX_BLOB_HASHES),
                    |i| used_indices.contains(i),
                )?
            };
            if !assignment.bind(var.clone(), U256::from(index as u64)) {
                return Err(UnsatisfiableReason::conflict("transaction_context", format!("{var} already bound")).into());
            }
            used_indices.insert(index);
            match presence {
                Presence::Present => {
                    present_indices.insert(index);
                }
                Presence::Absent => {
                    absent_indices.insert(index);
                }
            }
        }

        let max_present = present_indices.iter().max().copied();
        let min_absent = absent_indices.iter().min().copied();
        if let (Some(mp), Some(ma)) = (max_present, min_absent) {
            if ma <= mp {
                return Err(UnsatisfiableReason::conflict(
                    "transaction_context",
                    format!("blob hash index {ma} is required both present (via index {mp}) and absent"),
                )
                .into());
            }
        }

        let min_len = max_present.map(|i| i + 1).unwrap_or(0);
        let max_len = min_absent.unwrap_or(DEFAULT_MAX_BLOB_HASHES.max(min_len));
        let len = rng.gen_range(min_len..=max_len);
        let blob_hashes = (0..len).map(|_| Hash::random(rng)).collect();

        Ok(TransactionContext { origin, gas_price, blob_hashes })
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for TransactionContextGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(o) = self.origin {
            parts.push(format!("origin={o}"));
        }
        parts.push(format!("gasPrice: {}", self.gas_price));
        for (v, p) in &self.blob_hash_presence {
            parts.push(format!("blobHash[{v}]={}", if *p == Presence::Present { "present" } else { "absent" }));
        }
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn required_present_index_is_covered_by_the_list() {
        let mut g = TransactionContextGenerator::new();
        let v = Variable::new("i");
        g.require_blob_hash_present(v.clone());
        let mut a = Assignment::new();
        assert!(a.bind(v.clone(), U256::from(2u64)));
        let mut rng = StdRng::seed_from_u64(1);
        let ctx = g.generate(&mut a, &mut rng).unwrap();
        assert!(ctx.blob_hashes.len() >= 3);
    }

    #[test]
    fn required_absent_index_is_not_covered_by_the_list() {
        let mut g = TransactionContextGenerator::new();
        let v = Variable::new("i");
        g.require_blob_hash_absent(v.clone());
        let mut a = Assignment::new();
        assert!(a.bind(v.clone(), U256::from(0u64)));
        let mut rng = StdRng::seed_from_u64(2);
        let ctx = g.generate(&mut a, &mut rng).unwrap();
        assert!(ctx.blob_hashes.is_empty());
    }

    #[test]
    fn present_and_absent_at_the_same_index_is_unsatisfiable() {
        let mut g = TransactionContextGenerator::new();
        g.require_blob_hash_present(Variable::new("p"));
        g.require_blob_hash_absent(Variable::new("a"));
        let mut ass = Assignment::new();
        assert!(ass.bind(Variable::new("p"), U256::from(3u64)));
        assert!(ass.bind(Variable::new("a"), U256::from(1u64)));
        let mut rng = StdRng::seed_from_u64(3);
        assert!(g.generate(&mut ass, &mut rng).is_err());
    }

    #[test]
    fn binding_the_same_variable_present_then_absent_is_unsatisfiable() {
        let mut g = TransactionContextGenerator::new();
        let v = Variable::new("i");
        g.require_blob_hash_present(v.clone());
        g.require_blob_hash_absent(v);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(4);
        assert!(g.generate(&mut a, &mut rng).is_err());
    }

    #[test]
    fn unbound_index_variable_is_resolved_and_bound() {
        let mut g = TransactionContextGenerator::new();
        let v = Variable::new("i");
        g.require_blob_hash_present(v.clone());
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(5);
        let ctx = g.generate(&mut a, &mut rng).unwrap();
        let idx = a.get(&v).unwrap().as_u64() as usize;
        assert!(ctx.blob_hashes.len() > idx);
    }
}
