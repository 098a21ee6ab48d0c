//! spec.md §4.3.1 — `VarCodeConstraintSolver`: position + op placement for
//! variable code constraints.
//!
//! Intentionally sound-but-incomplete for multi-variable cases (spec.md §9
//! design notes): positions are picked greedily, random start + a single
//! wrap-around, with no backtracking.

use std::collections::BTreeMap;

use primitive_types::U256;
use rand::{Rng, RngCore};

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{is_push, push_width, OpCode, JUMPDEST, VALID_NON_PUSH_OPCODES};
use crate::variable::{Assignment, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Unused,
    IsCode,
    IsData,
}

pub struct VarCodeConstraintSolver {
    size: usize,
    used: BTreeMap<usize, Slot>,
    /// The augmented constant-op list produced so far: `(pos, op)`.
    pinned: Vec<(usize, OpCode)>,
}

impl VarCodeConstraintSolver {
    /// `const_ops` are the already-resolved `constOp`s (including folded
    /// `varOp`s); they seed `used` with `IsCode` at their position and
    /// `IsData` at the PUSH-tail bytes that follow.
    ///
    /// Callers are expected to have already rejected two different opcodes
    /// pinned at the same position; this only guards against that
    /// invariant being violated rather than re-deriving it, since silently
    /// letting the second `used.insert` win would hide a real conflict.
    pub fn new(size: usize, const_ops: &[(usize, OpCode)]) -> Result<Self, GenerateError> {
        let mut used = BTreeMap::new();
        let mut pinned_op_at: BTreeMap<usize, OpCode> = BTreeMap::new();
        for &(pos, op) in const_ops {
            if let Some(&existing) = pinned_op_at.get(&pos) {
                if existing != op {
                    return Err(UnsatisfiableReason::conflict(
                        "op",
                        format!("position {pos} is bound to both {existing:#04x} and {op:#04x}"),
                    )
                    .into());
                }
            }
            pinned_op_at.insert(pos, op);
            used.insert(pos, Slot::IsCode);
            if is_push(op) {
                for k in 1..=push_width(op) as usize {
                    used.insert(pos + k, Slot::IsData);
                }
            }
        }
        Ok(Self { size, used, pinned: const_ops.to_vec() })
    }

    fn slot_at(&self, pos: usize) -> Slot {
        self.used.get(&pos).copied().unwrap_or(Slot::Unused)
    }

    /// `true` iff `op` (and its PUSH tail, if any) fit within `[pos..size)`
    /// with every target slot `Unused`.
    fn fits(&self, pos: usize, op: OpCode) -> bool {
        let width = if is_push(op) { 1 + push_width(op) as usize } else { 1 };
        if pos + width > self.size {
            return false;
        }
        (pos..pos + width).all(|p| self.slot_at(p) == Slot::Unused)
    }

    /// Longest run of `Unused` slots starting at `pos`, capped at 33 (the
    /// widest footprint any single opcode — `PUSH32` plus its opcode byte —
    /// can need).
    fn largest_fit(&self, pos: usize) -> usize {
        let mut len = 0;
        while pos + len < self.size && len < 33 && self.slot_at(pos + len) == Slot::Unused {
            len += 1;
        }
        len
    }

    fn pin(&mut self, pos: usize, op: OpCode) {
        self.used.insert(pos, Slot::IsCode);
        if is_push(op) {
            for k in 1..=push_width(op) as usize {
                self.used.insert(pos + k, Slot::IsData);
            }
        }
        self.pinned.push((pos, op));
    }

    fn random_start(&self, rng: &mut dyn RngCore) -> usize {
        if self.size == 0 {
            0
        } else {
            rng.gen_range(0..self.size)
        }
    }

    /// Walk positions starting at a random slot, wrapping around once,
    /// returning the first position for which `pred` holds.
    fn find_wrapping(&self, rng: &mut dyn RngCore, mut pred: impl FnMut(&Self, usize) -> bool) -> Option<usize> {
        if self.size == 0 {
            return None;
        }
        let start = self.random_start(rng);
        for offset in 0..self.size {
            let pos = (start + offset) % self.size;
            if pred(self, pos) {
                return Some(pos);
            }
        }
        None
    }

    /// Pass A: place every `varOp` not already folded into a `constOp`.
    pub fn solve_var_ops(
        &mut self,
        var_ops: &[(Variable, OpCode)],
        assignment: &mut Assignment,
        rng: &mut dyn RngCore,
    ) -> Result<(), GenerateError> {
        let mut bound_op: BTreeMap<Variable, OpCode> = BTreeMap::new();
        for (var, op) in var_ops {
            if let Some(&prior) = bound_op.get(var) {
                if prior != *op {
                    return Err(UnsatisfiableReason::conflict(
                        "varOp",
                        format!("{var} already bound to a different opcode"),
                    )
                    .into());
                }
                continue;
            }
            let op = *op;
            let pos = self
                .find_wrapping(rng, |s, p| s.fits(p, op))
                .ok_or_else(|| {
                    UnsatisfiableReason::out_of_range(
                        "varOp",
                        format!("no position fits opcode {op:#04x} for {var}"),
                    )
                })?;
            self.pin(pos, op);
            bound_op.insert(var.clone(), op);
            if !assignment.bind(var.clone(), U256::from(pos as u64)) {
                return Err(UnsatisfiableReason::conflict(
                    "varOp",
                    format!("{var} already bound to a conflicting position"),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Pass B: each `isCode` variable gets a non-PUSH, code-valid opcode at
    /// some position that is not `IsData`.
    pub fn solve_is_code(
        &mut self,
        is_code_vars: &[Variable],
        assignment: &mut Assignment,
        rng: &mut dyn RngCore,
    ) -> Result<(), GenerateError> {
        for var in is_code_vars {
            if let Some(pos) = assignment.get(var) {
                let pos = pos.as_u64() as usize;
                if self.slot_at(pos) == Slot::IsCode {
                    continue;
                }
                if self.slot_at(pos) == Slot::IsData {
                    return Err(UnsatisfiableReason::conflict(
                        "isCode",
                        format!("{var} is pre-assigned to a PUSH-data position"),
                    )
                    .into());
                }
                // Unused: pin a JUMPDEST-equivalent op here (spec.md open
                // question, resolved in favor of pinning — SPEC_FULL.md).
                if !self.fits(pos, JUMPDEST) {
                    return Err(UnsatisfiableReason::out_of_range(
                        "isCode",
                        format!("{var}'s pre-assigned position does not fit a code op"),
                    )
                    .into());
                }
                self.pin(pos, JUMPDEST);
                continue;
            }
            let pos = self
                .find_wrapping(rng, |s, p| s.slot_at(p) != Slot::IsData)
                .ok_or_else(|| UnsatisfiableReason::out_of_range("isCode", format!("no position for {var}")))?;
            if self.slot_at(pos) == Slot::Unused {
                self.pin(pos, JUMPDEST);
            }
            if !assignment.bind(var.clone(), U256::from(pos as u64)) {
                return Err(UnsatisfiableReason::conflict(
                    "isCode",
                    format!("{var} already bound to a conflicting position"),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Pass C: each `isData` variable lands on an existing `IsData` slot or
    /// an `Unused` run long enough to host a fresh `PUSH_k`.
    pub fn solve_is_data(
        &mut self,
        is_data_vars: &[Variable],
        assignment: &mut Assignment,
        rng: &mut dyn RngCore,
    ) -> Result<(), GenerateError> {
        for var in is_data_vars {
            if let Some(pos) = assignment.get(var) {
                let pos = pos.as_u64() as usize;
                if self.slot_at(pos) == Slot::IsCode {
                    return Err(UnsatisfiableReason::conflict(
                        "isData",
                        format!("{var} is pre-assigned to a code position"),
                    )
                    .into());
                }
                continue;
            }
            let pos = self
                .find_wrapping(rng, |s, p| s.slot_at(p) == Slot::IsData || s.largest_fit(p) >= 2)
                .ok_or_else(|| UnsatisfiableReason::out_of_range("isData", format!("no position for {var}")))?;
            if self.slot_at(pos) == Slot::IsData {
                if !assignment.bind(var.clone(), U256::from(pos as u64)) {
                    return Err(UnsatisfiableReason::conflict(
                        "isData",
                        format!("{var} already bound to a conflicting position"),
                    )
                    .into());
                }
                continue;
            }
            let run = self.largest_fit(pos);
            // Choose k so the PUSH_k tail fits inside the run (k in 1..=run-1).
            let max_k = (run - 1).min(32);
            let k = rng.gen_range(1..=max_k) as u8;
            let op = crate::evm::PUSH1 + k - 1;
            self.pin(pos, op);
            let data_offset = rng.gen_range(1..=k as usize);
            if !assignment.bind(var.clone(), U256::from((pos + data_offset) as u64)) {
                return Err(UnsatisfiableReason::conflict(
                    "isData",
                    format!("{var} already bound to a conflicting position"),
                )
                .into());
            }
        }
        Ok(())
    }

    /// A random, code-valid non-PUSH opcode, used by the byte-filler when
    /// it needs "some code op" but no constraint pins one.
    pub fn random_non_push_opcode(rng: &mut dyn RngCore) -> OpCode {
        let idx = rng.gen_range(0..VALID_NON_PUSH_OPCODES.len());
        VALID_NON_PUSH_OPCODES[idx]
    }

    pub fn into_pinned(self) -> Vec<(usize, OpCode)> {
        self.pinned
    }
}
