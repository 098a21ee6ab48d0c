//! spec.md §4.10a — `CallContextGenerator`: small scalar constraints over
//! caller, call value, static-ness and call depth.

use std::fmt;

use primitive_types::U256;
use rand::{Rng, RngCore};

use crate::error::GenerateError;
use crate::evm::Address;
use crate::solver::RangeSolver;
use crate::state::CallContext;

#[derive(Debug, Clone, Default)]
pub struct CallContextGenerator {
    caller: Option<Address>,
    call_value: RangeSolver<U256>,
    is_static: Option<bool>,
    depth: RangeSolver<u64>,
}

impl CallContextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_caller(&mut self, caller: Address) {
        self.caller = Some(caller);
    }

    pub fn add_call_value_min(&mut self, min: U256) {
        self.call_value.add_lower_boundary(min);
    }

    pub fn add_call_value_max(&mut self, max: U256) {
        self.call_value.add_upper_boundary(max);
    }

    pub fn set_is_static(&mut self, is_static: bool) {
        self.is_static = Some(is_static);
    }

    pub fn add_depth_min(&mut self, min: u64) {
        self.depth.add_lower_boundary(min);
    }

    pub fn add_depth_max(&mut self, max: u64) {
        self.depth.add_upper_boundary(max);
    }

    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<CallContext, GenerateError> {
        let caller = self.caller.unwrap_or_else(|| Address::random(rng));
        let call_value = self.call_value.generate(rng)?;
        let is_static = self.is_static.unwrap_or_else(|| rng.gen_bool(0.1));
        let depth = self.depth.generate(rng)? as u32;
        Ok(CallContext { caller, call_value, is_static, depth })
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for CallContextGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(c) = self.caller {
            parts.push(format!("caller={c}"));
        }
        parts.push(format!("callValue: {}", self.call_value));
        if let Some(s) = self.is_static {
            parts.push(format!("isStatic={s}"));
        }
        parts.push(format!("depth: {}", self.depth));
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn set_caller_is_respected() {
        let mut g = CallContextGenerator::new();
        let caller = Address::random(&mut StdRng::seed_from_u64(1));
        g.set_caller(caller);
        let mut rng = StdRng::seed_from_u64(2);
        let ctx = g.generate(&mut rng).unwrap();
        assert_eq!(ctx.caller, caller);
    }

    #[test]
    fn call_value_bounds_are_respected() {
        let mut g = CallContextGenerator::new();
        g.add_call_value_min(U256::from(10));
        g.add_call_value_max(U256::from(20));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let ctx = g.generate(&mut rng).unwrap();
            assert!(ctx.call_value >= U256::from(10) && ctx.call_value <= U256::from(20));
        }
    }
}
