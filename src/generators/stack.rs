//! spec.md §4.4 — `StackGenerator`.

use std::collections::BTreeMap;
use std::fmt;

use primitive_types::U256;
use rand::RngCore;

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::random_u256;
use crate::solver::RangeSolver;
use crate::state::Stack;
use crate::variable::{Assignment, Variable};

/// Upper bound on stack size (EVM's own 1024-slot limit).
pub const MAX_STACK_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct StackGenerator {
    size: RangeSolver<u64>,
    const_values: BTreeMap<usize, U256>,
    var_values: BTreeMap<usize, Variable>,
}

impl Default for StackGenerator {
    fn default() -> Self {
        Self {
            size: RangeSolver::new(0, MAX_STACK_SIZE as u64),
            const_values: BTreeMap::new(),
            var_values: BTreeMap::new(),
        }
    }
}

impl StackGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_min_size(&mut self, min: usize) {
        self.size.add_lower_boundary(min as u64);
    }

    pub fn add_max_size(&mut self, max: usize) {
        self.size.add_upper_boundary(max as u64);
    }

    pub fn set_size(&mut self, size: usize) {
        self.size.add_equality_constraint(size as u64);
    }

    pub fn set_value(&mut self, pos: usize, value: U256) {
        self.const_values.insert(pos, value);
    }

    pub fn set_var_value(&mut self, pos: usize, var: Variable) {
        self.var_values.insert(pos, var);
    }

    /// spec.md §4.4 `Generate`: the only stage that requires a pre-bound
    /// variable (spec.md §7) — [`GenerateError::UnboundVariable`] if a
    /// `varValues` entry has no binding.
    pub fn generate(&self, assignment: &Assignment, rng: &mut dyn RngCore) -> Result<Stack, GenerateError> {
        let mut values = self.const_values.clone();
        for (pos, var) in &self.var_values {
            let value = assignment
                .get(var)
                .ok_or_else(|| GenerateError::UnboundVariable(var.clone()))?;
            match values.get(pos) {
                Some(existing) if *existing != value => {
                    return Err(UnsatisfiableReason::conflict(
                        "stack",
                        format!("position {pos} pinned to two different values"),
                    )
                    .into());
                }
                _ => {
                    values.insert(*pos, value);
                }
            }
        }

        let mut size_solver = self.size;
        if let Some(&max_pos) = values.keys().max() {
            size_solver.add_lower_boundary((max_pos + 1) as u64);
        }
        let size = size_solver.generate(rng)? as usize;

        let mut stack = vec![U256::zero(); size];
        for (&pos, &value) in &values {
            if pos >= size {
                return Err(UnsatisfiableReason::out_of_range(
                    "stack",
                    format!("position {pos} is beyond the generated stack size {size}"),
                )
                .into());
            }
            stack[pos] = value;
        }
        let pinned: std::collections::BTreeSet<usize> = values.keys().copied().collect();
        for (pos, slot) in stack.iter_mut().enumerate() {
            if !pinned.contains(&pos) {
                *slot = random_u256(rng);
            }
        }

        Ok(Stack::new(stack))
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for StackGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack[{}]", self.size)?;
        for (pos, v) in &self.const_values {
            write!(f, ",stack[{pos}]={v:#x}")?;
        }
        for (pos, var) in &self.var_values {
            write!(f, ",stack[{pos}]={var}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn min_max_bounds_are_respected() {
        let mut g = StackGenerator::new();
        g.add_min_size(3);
        g.add_max_size(5);
        let mut rng = StdRng::seed_from_u64(1);
        let a = Assignment::new();
        for _ in 0..20 {
            let stack = g.generate(&a, &mut rng).unwrap();
            assert!((3..=5).contains(&stack.size()));
        }
    }

    #[test]
    fn set_value_is_respected() {
        let mut g = StackGenerator::new();
        g.set_value(2, U256::from(99));
        let a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(2);
        let stack = g.generate(&a, &mut rng).unwrap();
        assert_eq!(stack.get(2), Some(U256::from(99)));
    }

    #[test]
    fn unbound_var_value_errors() {
        let mut g = StackGenerator::new();
        g.set_var_value(0, Variable::new("missing"));
        let a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(g.generate(&a, &mut rng), Err(GenerateError::UnboundVariable(_))));
    }
}
