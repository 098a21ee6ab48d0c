//! spec.md §4.6 — `StorageGenerator`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use primitive_types::U256;
use rand::{Rng, RngCore};

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{classify_storage_status, status_requires_zero_new, StorageStatus};
use crate::rand_util::fresh_value;
use crate::solver::IntervalSolver;
use crate::state::{Storage, StorageSlot};
use crate::variable::{Assignment, Variable};

/// Maximum number of undirected decoy storage entries (spec.md §4.6 step 5;
/// SPEC_FULL.md Open Question resolution: a coverage heuristic, not a
/// behavioral contract).
pub const MAX_DECOY_ENTRIES: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cfg {
    key: Variable,
    new_value_var: Variable,
    status: StorageStatus,
}

#[derive(Debug, Clone, Default)]
pub struct StorageGenerator {
    cfgs: Vec<Cfg>,
    warm_cold: BTreeMap<Variable, bool>,
    unsatisfiable: bool,
}

impl StorageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_storage_configuration(&mut self, status: StorageStatus, key: Variable, new_value_var: Variable) {
        self.cfgs.push(Cfg { key, new_value_var, status });
    }

    pub fn bind_warm_cold(&mut self, key: Variable, warm: bool) {
        match self.warm_cold.get(&key) {
            Some(&existing) if existing != warm => self.unsatisfiable = true,
            _ => {
                self.warm_cold.insert(key, warm);
            }
        }
    }

    /// Sample a [`U256`] excluding every value in `excluded`, via
    /// [`IntervalSolver`] (spec.md §4.2's exclusion-based solver, used here
    /// instead of a retry loop since the exclusion sets are a handful of
    /// literal points).
    fn sample_excluding(rng: &mut dyn RngCore, excluded: &[U256]) -> Result<U256, GenerateError> {
        let mut solver: IntervalSolver<U256> = IntervalSolver::full();
        for &v in excluded {
            solver.exclude(v, v);
        }
        solver.generate(rng)
    }

    pub fn generate(&self, assignment: &mut Assignment, rng: &mut dyn RngCore) -> Result<Storage, GenerateError> {
        if self.unsatisfiable {
            return Err(UnsatisfiableReason::conflict("storage", "a key was bound both warm and cold").into());
        }

        // Step 1: conflict detection.
        let mut status_by_key: BTreeMap<&Variable, (&StorageStatus, &Variable)> = BTreeMap::new();
        for cfg in &self.cfgs {
            match status_by_key.get(&cfg.key) {
                Some((status, nv)) if **status != cfg.status || **nv != cfg.new_value_var => {
                    return Err(UnsatisfiableReason::conflict(
                        "storage",
                        format!("{} has conflicting cfg entries", cfg.key),
                    )
                    .into());
                }
                _ => {
                    status_by_key.insert(&cfg.key, (&cfg.status, &cfg.new_value_var));
                }
            }
        }
        // Step 2: resolve key variables to fresh U256 keys.
        let mut used_keys: BTreeSet<U256> = BTreeSet::new();
        let mut key_values: BTreeMap<Variable, U256> = BTreeMap::new();
        let mut all_keys: BTreeSet<Variable> = self.cfgs.iter().map(|c| c.key.clone()).collect();
        all_keys.extend(self.warm_cold.keys().cloned());
        for key in &all_keys {
            let value = if let Some(v) = assignment.get(key) {
                v
            } else {
                fresh_value(rng, crate::evm::random_u256, |v| used_keys.contains(v))?
            };
            if !assignment.bind(key.clone(), value) {
                return Err(UnsatisfiableReason::conflict("storage", format!("{key} already bound")).into());
            }
            used_keys.insert(value);
            key_values.insert(key.clone(), value);
        }

        let mut storage = Storage::new();

        // Step 3: for each cfg, pick newValue then original/current.
        for cfg in &self.cfgs {
            let key = key_values[&cfg.key];
            let requires_zero = status_requires_zero_new(cfg.status);
            let new_value = if let Some(v) = assignment.get(&cfg.new_value_var) {
                if v.is_zero() != requires_zero {
                    return Err(UnsatisfiableReason::conflict(
                        "storage",
                        format!(
                            "{} is pre-assigned {v:#x} but status {:?} requires zero={requires_zero}",
                            cfg.new_value_var, cfg.status
                        ),
                    )
                    .into());
                }
                v
            } else {
                let v = if requires_zero {
                    U256::zero()
                } else {
                    Self::sample_excluding(rng, &[U256::zero()])?
                };
                if !assignment.bind(cfg.new_value_var.clone(), v) {
                    return Err(
                        UnsatisfiableReason::conflict("storage", format!("{} already bound", cfg.new_value_var)).into(),
                    );
                }
                v
            };

            use StorageStatus::*;
            let (original, current) = match cfg.status {
                Added => (U256::zero(), U256::zero()),
                AddedDeleted => (U256::zero(), Self::sample_excluding(rng, &[U256::zero()])?),
                DeletedRestored => (new_value, U256::zero()),
                DeletedAdded => (Self::sample_excluding(rng, &[U256::zero(), new_value])?, U256::zero()),
                Deleted => {
                    let original = Self::sample_excluding(rng, &[U256::zero()])?;
                    (original, original)
                }
                Modified => {
                    let original = Self::sample_excluding(rng, &[U256::zero(), new_value])?;
                    (original, original)
                }
                ModifiedDeleted => {
                    let original = Self::sample_excluding(rng, &[U256::zero()])?;
                    let current = Self::sample_excluding(rng, &[U256::zero(), original])?;
                    (original, current)
                }
                ModifiedRestored => {
                    let original = new_value;
                    let current = Self::sample_excluding(rng, &[U256::zero(), original])?;
                    (original, current)
                }
                Assigned => {
                    let original = Self::sample_excluding(rng, &[U256::zero(), new_value])?;
                    let current = Self::sample_excluding(rng, &[U256::zero(), original, new_value])?;
                    (original, current)
                }
            };

            debug_assert_eq!(classify_storage_status(original, current, new_value), cfg.status);

            let warm = self.warm_cold.get(&cfg.key).copied().unwrap_or(true);
            storage.insert(key, StorageSlot { original, current, warm });
        }

        // Step 4: warm/cold-only keys (no cfg touched them).
        for (key_var, &warm) in &self.warm_cold {
            let key = key_values[key_var];
            if !storage.contains_key(key) {
                let original = crate::evm::random_u256(rng);
                let current = crate::evm::random_u256(rng);
                storage.insert(key, StorageSlot { original, current, warm });
            }
        }

        // Step 5: decoy entries.
        let decoys = rng.gen_range(0..=MAX_DECOY_ENTRIES);
        for _ in 0..decoys {
            let key = fresh_value(rng, crate::evm::random_u256, |v| used_keys.contains(v))?;
            used_keys.insert(key);
            let original = crate::evm::random_u256(rng);
            let current = crate::evm::random_u256(rng);
            let warm = rng.gen_bool(0.5);
            storage.insert(key, StorageSlot { original, current, warm });
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

impl fmt::Display for StorageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfgs: Vec<String> = self
            .cfgs
            .iter()
            .map(|c| format!("storage[{}]={:?}(nv={})", c.key, c.status, c.new_value_var))
            .collect();
        let wc: Vec<String> = self
            .warm_cold
            .iter()
            .map(|(k, w)| format!("{}({k})", if *w { "warm" } else { "cold" }))
            .collect();
        write!(f, "{}", cfgs.into_iter().chain(wc).collect::<Vec<_>>().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;

    #[rstest]
    #[case(StorageStatus::Added)]
    #[case(StorageStatus::AddedDeleted)]
    #[case(StorageStatus::DeletedRestored)]
    #[case(StorageStatus::DeletedAdded)]
    #[case(StorageStatus::Deleted)]
    #[case(StorageStatus::Modified)]
    #[case(StorageStatus::ModifiedDeleted)]
    #[case(StorageStatus::ModifiedRestored)]
    #[case(StorageStatus::Assigned)]
    fn every_status_round_trips_through_classification(#[case] status: StorageStatus) {
        let mut g = StorageGenerator::new();
        g.bind_storage_configuration(status, Variable::new("k"), Variable::new("nv"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(status as u64 + 1);
        let storage = g.generate(&mut a, &mut rng).unwrap();
        let key = a.get(&Variable::new("k")).unwrap();
        let slot = storage.get(key).unwrap();
        let nv = a.get(&Variable::new("nv")).unwrap();
        assert_eq!(classify_storage_status(slot.original, slot.current, nv), status);
    }

    #[test]
    fn added_forces_zero_original_and_current() {
        let mut g = StorageGenerator::new();
        g.bind_storage_configuration(StorageStatus::Added, Variable::new("k"), Variable::new("nv"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(42);
        let storage = g.generate(&mut a, &mut rng).unwrap();
        let key = a.get(&Variable::new("k")).unwrap();
        let slot = storage.get(key).unwrap();
        assert!(slot.original.is_zero());
        assert!(slot.current.is_zero());
    }

    #[test]
    fn conflicting_warm_and_cold_is_unsatisfiable() {
        let mut g = StorageGenerator::new();
        g.bind_warm_cold(Variable::new("k"), true);
        g.bind_warm_cold(Variable::new("k"), false);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(g.generate(&mut a, &mut rng).is_err());
    }
}
