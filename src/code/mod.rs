//! spec.md §4.3 — `CodeGenerator`: produces a byte-code satisfying
//! op/isCode/isData constraints.

mod var_solver;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;
use rand::{Rng, RngCore};

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{is_push, push_width, OpCode};
use crate::state::Code;
use crate::variable::{Assignment, Variable};
use var_solver::VarCodeConstraintSolver;

/// Upper bound on generated code length, matching EIP-170's contract code
/// size cap.
pub const MAX_CODE_SIZE: usize = 24_576;

/// One constraint on the generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CodeConstraint {
    ConstOp(usize, OpCode),
    VarOp(Variable, OpCode),
    IsCode(Variable),
    IsData(Variable),
}

/// spec.md §4.3: owns const/var op placement, `isCode`/`isData` membership,
/// and an optional fixed size (for tests).
#[derive(Debug, Clone, Default)]
pub struct CodeGenerator {
    constraints: Vec<CodeConstraint>,
    fixed_size: Option<usize>,
    unsatisfiable: bool,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_unique(&mut self, c: CodeConstraint) {
        if !self.constraints.contains(&c) {
            self.constraints.push(c);
        }
    }

    pub fn set_operation(&mut self, pos: usize, op: OpCode) {
        if let Some(&(_, existing)) = self.const_ops().iter().find(|&&(p, _)| p == pos) {
            if existing != op {
                self.unsatisfiable = true;
            }
        }
        self.push_unique(CodeConstraint::ConstOp(pos, op));
    }

    pub fn add_operation(&mut self, var: Variable, op: OpCode) {
        self.push_unique(CodeConstraint::VarOp(var, op));
    }

    pub fn add_is_code(&mut self, var: Variable) {
        self.push_unique(CodeConstraint::IsCode(var));
    }

    pub fn add_is_data(&mut self, var: Variable) {
        self.push_unique(CodeConstraint::IsData(var));
    }

    pub fn set_fixed_size(&mut self, size: usize) {
        self.fixed_size = Some(size);
    }

    fn const_ops(&self) -> Vec<(usize, OpCode)> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                CodeConstraint::ConstOp(pos, op) => Some((*pos, *op)),
                _ => None,
            })
            .collect()
    }

    fn var_ops(&self) -> Vec<(Variable, OpCode)> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                CodeConstraint::VarOp(v, op) => Some((v.clone(), *op)),
                _ => None,
            })
            .collect()
    }

    fn is_code_vars(&self) -> Vec<Variable> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                CodeConstraint::IsCode(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    fn is_data_vars(&self) -> Vec<Variable> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                CodeConstraint::IsData(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Draw from an exponential distribution with mean `mean`, via inverse
    /// transform sampling (`-mean * ln(1 - u)`), matching spec.md §4.3's
    /// `exp(200)` size draw without pulling in a distributions crate the
    /// teacher doesn't already depend on.
    fn exp_sample(rng: &mut dyn RngCore, mean: f64) -> f64 {
        let u: f64 = rng.gen_range(0.0..1.0);
        -mean * (1.0 - u).ln()
    }

    /// spec.md §4.3 `Generate(assignment, rnd)`.
    pub fn generate(&self, assignment: &mut Assignment, rng: &mut dyn RngCore) -> Result<Code, GenerateError> {
        if self.unsatisfiable {
            return Err(UnsatisfiableReason::conflict("op", "a position was bound to two different opcodes").into());
        }

        // Step 1: fold varOp against the assignment.
        let mut const_ops = self.const_ops();
        let mut remaining_var_ops = Vec::new();
        for (var, op) in self.var_ops() {
            if let Some(value) = assignment.get(&var) {
                let pos = value.as_u64() as usize;
                if pos >= MAX_CODE_SIZE {
                    return Err(UnsatisfiableReason::out_of_range(
                        "varOp",
                        format!("{var} is bound to position {pos} which exceeds MaxCodeSize"),
                    )
                    .into());
                }
                const_ops.push((pos, op));
            } else {
                remaining_var_ops.push((var, op));
            }
        }

        // A var-op folded against the assignment can still collide with a
        // literal `SetOperation` (or another folded var-op) at the same
        // position; neither `set_operation` nor the solver below can see
        // that until the assignment is resolved, so check it here.
        let mut seen: BTreeMap<usize, OpCode> = BTreeMap::new();
        for &(pos, op) in &const_ops {
            match seen.get(&pos) {
                Some(&existing) if existing != op => {
                    return Err(UnsatisfiableReason::conflict(
                        "op",
                        format!("position {pos} is bound to both {existing:#04x} and {op:#04x}"),
                    )
                    .into());
                }
                _ => {
                    seen.insert(pos, op);
                }
            }
        }

        // Step 2: choose a size.
        let mut min_size = const_ops.iter().map(|(pos, _)| pos + 1).max().unwrap_or(0);
        for (_, op) in &remaining_var_ops {
            let footprint = 1 + if is_push(*op) { push_width(*op) as usize } else { 0 };
            min_size = min_size.max(footprint);
        }
        let distinct_opcodes: BTreeSet<OpCode> = const_ops
            .iter()
            .map(|(_, op)| *op)
            .chain(remaining_var_ops.iter().map(|(_, op)| *op))
            .collect();
        min_size = min_size.max(distinct_opcodes.len());

        let is_code_vars = self.is_code_vars();
        let is_data_vars = self.is_data_vars();
        if !is_code_vars.is_empty() && min_size == 0 {
            min_size = 1;
        }
        if !is_data_vars.is_empty() && min_size < 2 {
            min_size = 2;
        }

        if min_size > MAX_CODE_SIZE {
            return Err(UnsatisfiableReason::empty_domain(
                "code size",
                format!("minimum required size {min_size} exceeds MaxCodeSize {MAX_CODE_SIZE}"),
            )
            .into());
        }

        let size = if let Some(fixed) = self.fixed_size {
            if fixed < min_size {
                return Err(UnsatisfiableReason::empty_domain(
                    "code size",
                    format!("fixed size {fixed} is smaller than the minimum required {min_size}"),
                )
                .into());
            }
            fixed
        } else {
            let draw = Self::exp_sample(rng, 200.0);
            let wanted = min_size as f64 + draw;
            (wanted.floor() as usize).clamp(min_size, MAX_CODE_SIZE)
        };

        // Step 3: solve variable constraints.
        let mut solver = VarCodeConstraintSolver::new(size, &const_ops)?;
        solver.solve_var_ops(&remaining_var_ops, assignment, rng)?;
        solver.solve_is_code(&is_code_vars, assignment, rng)?;
        solver.solve_is_data(&is_data_vars, assignment, rng)?;
        let pinned: Vec<(usize, OpCode)> = solver
            .into_pinned()
            .into_iter()
            .sorted_by_key(|(pos, _)| *pos)
            .unique_by(|(pos, _)| *pos)
            .collect();

        // Step 5 (post-check, done early so we can bail before filling).
        if let Some(&(last_pos, last_op)) = pinned.last() {
            let width = if is_push(last_op) { 1 + push_width(last_op) as usize } else { 1 };
            if last_pos + width > size {
                return Err(UnsatisfiableReason::out_of_range(
                    "code",
                    format!("pinned op at {last_pos} extends past generated size {size}"),
                )
                .into());
            }
        }

        // Step 4: fill the code bytes.
        let mut bytes = vec![0u8; size];
        let mut is_code = vec![false; size];
        let mut next_pinned = pinned.iter().peekable();
        let mut i = 0usize;
        while i < size {
            if let Some(&&(pos, op)) = next_pinned.peek() {
                if pos < i {
                    return Err(UnsatisfiableReason::Other(format!(
                        "pinned position {pos} was skipped during fill"
                    ))
                    .into());
                }
                if pos == i {
                    bytes[i] = op;
                    is_code[i] = true;
                    let width = if is_push(op) { push_width(op) as usize } else { 0 };
                    for k in 1..=width {
                        bytes[i + k] = crate::evm::random_bytes(rng, 1)[0];
                    }
                    i += 1 + width;
                    next_pinned.next();
                    continue;
                }
            }
            let distance_to_next_pinned = next_pinned.peek().map(|&&(pos, _)| pos - i).unwrap_or(size - i);
            let mut op = crate::evm::random_opcode(rng);
            if is_push(op) {
                let k = push_width(op) as usize;
                if k >= distance_to_next_pinned {
                    if distance_to_next_pinned <= 1 {
                        op = VarCodeConstraintSolver::random_non_push_opcode(rng);
                    } else {
                        op = crate::evm::PUSH1 + (distance_to_next_pinned as u8 - 2);
                    }
                }
            }
            bytes[i] = op;
            is_code[i] = true;
            let width = if is_push(op) { push_width(op) as usize } else { 0 };
            for k in 1..=width {
                bytes[i + k] = crate::evm::random_bytes(rng, 1)[0];
            }
            i += 1 + width;
        }

        Ok(Code::new(bytes, is_code))
    }
}

impl fmt::Display for CodeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .constraints
            .iter()
            .map(|c| match c {
                CodeConstraint::ConstOp(pos, op) => format!("op[{pos}]={op:#04x}"),
                CodeConstraint::VarOp(v, op) => format!("op[{v}]={op:#04x}"),
                CodeConstraint::IsCode(v) => format!("isCode[{v}]"),
                CodeConstraint::IsData(v) => format!("isData[{v}]"),
            })
            .collect();
        write!(f, "{{{}}}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::{ADD, INVALID, JUMPDEST, PUSH1, PUSH2, STOP};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn push2_reserves_following_bytes() {
        let mut gen = CodeGenerator::new();
        gen.set_operation(4, PUSH2);
        gen.set_operation(7, STOP);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        let code = gen.generate(&mut a, &mut rng).unwrap();
        assert!(code.is_code(4));
        assert!(code.is_data(5));
        assert!(code.is_data(6));
        assert!(code.is_code(7));
        assert_eq!(code.get(7), Some(STOP));
    }

    #[test]
    fn conflicting_push_and_op_is_unsatisfiable() {
        let mut gen = CodeGenerator::new();
        gen.set_operation(4, PUSH2);
        gen.set_operation(5, STOP);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(gen.generate(&mut a, &mut rng).is_err());
    }

    #[test]
    fn var_ops_land_at_distinct_positions() {
        let mut gen = CodeGenerator::new();
        gen.add_operation(Variable::new("A"), STOP);
        gen.add_operation(Variable::new("B"), ADD);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(2);
        let code = gen.generate(&mut a, &mut rng).unwrap();
        let pa = a.get(&Variable::new("A")).unwrap().as_u64() as usize;
        let pb = a.get(&Variable::new("B")).unwrap().as_u64() as usize;
        assert_ne!(pa, pb);
        assert_eq!(code.get(pa), Some(STOP));
        assert_eq!(code.get(pb), Some(ADD));
    }

    #[test]
    fn is_code_pins_jumpdest_when_unused() {
        let mut gen = CodeGenerator::new();
        gen.add_is_code(Variable::new("X"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(5);
        let code = gen.generate(&mut a, &mut rng).unwrap();
        let pos = a.get(&Variable::new("X")).unwrap().as_u64() as usize;
        assert!(code.is_code(pos));
        assert_eq!(code.get(pos), Some(JUMPDEST));
    }

    #[test]
    fn is_data_lands_on_push_tail() {
        let mut gen = CodeGenerator::new();
        gen.add_is_data(Variable::new("D"));
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(11);
        let code = gen.generate(&mut a, &mut rng).unwrap();
        let pos = a.get(&Variable::new("D")).unwrap().as_u64() as usize;
        assert!(code.is_data(pos));
    }

    #[test]
    fn same_position_conflicting_const_ops_is_unsatisfiable() {
        let mut gen = CodeGenerator::new();
        gen.set_operation(4, STOP);
        gen.set_operation(4, ADD);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(gen.generate(&mut a, &mut rng).is_err());
    }

    #[test]
    fn var_op_folds_into_conflicting_const_op_position() {
        let mut gen = CodeGenerator::new();
        gen.set_operation(4, STOP);
        gen.add_operation(Variable::new("A"), ADD);
        let mut a = Assignment::new();
        assert!(a.bind(Variable::new("A"), primitive_types::U256::from(4u64)));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(gen.generate(&mut a, &mut rng).is_err());
    }

    #[test]
    fn fixed_size_too_small_is_unsatisfiable() {
        let mut gen = CodeGenerator::new();
        gen.set_operation(10, INVALID);
        gen.set_fixed_size(5);
        let mut a = Assignment::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(gen.generate(&mut a, &mut rng).is_err());
    }
}
