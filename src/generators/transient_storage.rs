//! spec.md §4.7 — `TransientStorageGenerator` (EIP-1153).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use primitive_types::U256;
use rand::{Rng, RngCore};

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::random_u256;
use crate::rand_util::fresh_value;
use crate::state::TransientStorage;
use crate::variable::{Assignment, Variable};

/// Maximum number of undirected decoy transient-storage entries. EIP-1153
/// slots only exist for the duration of a transaction, so there is no
/// original/current split and no warm/cold bit to carry.
pub const MAX_DECOY_ENTRIES: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zeroness {
    Zero,
    NonZero,
}

#[derive(Debug, Clone, Default)]
pub struct TransientStorageGenerator {
    constraints: BTreeMap<Variable, Zeroness>,
    unsatisfiable: bool,
}

impl TransientStorageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_zero(&mut self, key: Variable) {
        self.bind(key, Zeroness::Zero);
    }

    pub fn bind_non_zero(&mut self, key: Variable) {
        self.bind(key, Zeroness::NonZero);
    }

    fn bind(&mut self, key: Variable, z: Zeroness) {
        match self.constraints.get(&key) {
            Some(existing) if *existing != z => self.unsatisfiable = true,
            _ => {
                self.constraints.insert(key, z);
            }
        }
    }

    pub fn generate(&self, assignment: &mut Assignment, rng: &mut dyn RngCore) -> Result<TransientStorage, GenerateError> {
        if self.unsatisfiable {
            return Err(UnsatisfiableReason::conflict(
                "transient_storage",
                "a key was bound both zero and non-zero",
            )
            .into());
        }

        let mut used_keys: BTreeSet<U256> = BTreeSet::new();
        let mut storage = TransientStorage::new();

        for (key_var, z) in &self.constraints {
            let key = if let Some(v) = assignment.get(key_var) {
                v
            } else {
                fresh_value(rng, random_u256, |v| used_keys.contains(v))?
            };
            if !assignment.bind(key_var.clone(), key) {
                return Err(UnsatisfiableReason::conflict("transient_storage", format!("{key_var} already bound")).into());
            }
            used_keys.insert(key);

            let value = match z {
                Zeroness::Zero => U256::zero(),
                Zeroness::NonZero => {
                    let mut v = random_u256(rng);
                    while v.is_zero() {
                        v = random_u256(rng);
                    }
                    v
                }
            };
            storage.insert(key, value);
        }

        let decoys = rng.gen_range(0..=MAX_DECOY_ENTRIES);
        for _ in 0..decoys {
            let key = fresh_value(rng, random_u256, |v| used_keys.contains(v))?;
            used_keys.insert(key);
            storage.insert(key, random_u256(rng));
        }

        Ok(storage)
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for TransientStorageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|(k, z)| match z {
                Zeroness::Zero => format!("tstorage[{k}]=0"),
                Zeroness::NonZero => format!("tstorage[{k}]≠0"),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn zero_constraint_yields_zero_value() {
        let mut g = TransientStorageGenerator::new();
        g.bind_zero(Variable::new("k"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        let ts = g.generate(&mut a, &mut rng).unwrap();
        let key = a.get(&Variable::new("k")).unwrap();
        assert!(ts.get(key).is_zero());
    }

    #[test]
    fn non_zero_constraint_yields_non_zero_value() {
        let mut g = TransientStorageGenerator::new();
        g.bind_non_zero(Variable::new("k"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(2);
        let ts = g.generate(&mut a, &mut rng).unwrap();
        let key = a.get(&Variable::new("k")).unwrap();
        assert!(!ts.get(key).is_zero());
    }

    #[test]
    fn conflicting_zero_and_non_zero_is_unsatisfiable() {
        let mut g = TransientStorageGenerator::new();
        g.bind_zero(Variable::new("k"));
        g.bind_non_zero(Variable::new("k"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(g.generate(&mut a, &mut rng).is_err());
    }
}
