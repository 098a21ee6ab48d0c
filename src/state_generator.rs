//! spec.md §4.11 — `StateGenerator`: the orchestrator that owns the scalar
//! cross-cutting constraints and sequences all ten sub-generators.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use primitive_types::U256;
use rand::RngCore;
use tracing::instrument;

use crate::code::CodeGenerator;
use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{address_from_u256, random_bytes, revision_for_block, u256_from_address, Address, Hash};
use crate::generators::accounts::AccountsGenerator;
use crate::generators::block_context::BlockContextGenerator;
use crate::generators::call_context::CallContextGenerator;
use crate::generators::call_journal::CallJournalGenerator;
use crate::generators::memory::MemoryGenerator;
use crate::generators::self_destructed::SelfDestructedGenerator;
use crate::generators::stack::StackGenerator;
use crate::generators::storage::StorageGenerator;
use crate::generators::transaction_context::TransactionContextGenerator;
use crate::generators::transient_storage::TransientStorageGenerator;
use crate::solver::RangeSolver;
use crate::state::{State, Status};
use crate::variable::{Assignment, Variable};

/// Upper bound on gas and |gas refund|, per spec.md §4.11 (`gas ∈
/// [0..MaxGasUsedByCt]`, `refund ∈ [-MaxGasUsedByCt..MaxGasUsedByCt]`).
pub const MAX_GAS_USED_BY_CT: u64 = 30_000_000;

/// Longest random call-data / last-call-return-data the orchestrator
/// synthesizes when neither is otherwise constrained (spec.md §4.11 step 9).
const MAX_AUX_DATA_LEN: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct StateGenerator {
    status: Vec<Status>,
    read_only: Vec<bool>,
    pc_const: Vec<u64>,
    pc_var: Vec<Variable>,
    gas: RangeSolver<u64>,
    gas_refund: RangeSolver<i128>,
    bindings: Vec<(Variable, U256)>,
    self_address_const: Vec<Address>,
    self_address_var: Vec<Variable>,

    code: CodeGenerator,
    stack: StackGenerator,
    memory: MemoryGenerator,
    storage: StorageGenerator,
    transient_storage: TransientStorageGenerator,
    accounts: AccountsGenerator,
    block_context: BlockContextGenerator,
    call_context: CallContextGenerator,
    call_journal: CallJournalGenerator,
    transaction_context: TransactionContextGenerator,
    self_destructed: SelfDestructedGenerator,
}

impl StateGenerator {
    pub fn new() -> Self {
        Self {
            gas: RangeSolver::new(0, MAX_GAS_USED_BY_CT),
            gas_refund: RangeSolver::new(-(MAX_GAS_USED_BY_CT as i128), MAX_GAS_USED_BY_CT as i128),
            ..Default::default()
        }
    }

    /* ---- cross-cutting scalar constraints ---- */

    pub fn set_status(&mut self, status: Status) {
        self.status.push(status);
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only.push(read_only);
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.pc_const.push(pc);
    }

    pub fn bind_pc(&mut self, var: Variable) {
        self.pc_var.push(var);
    }

    pub fn add_gas_min(&mut self, min: u64) {
        self.gas.add_lower_boundary(min);
    }

    pub fn add_gas_max(&mut self, max: u64) {
        self.gas.add_upper_boundary(max);
    }

    pub fn set_gas(&mut self, gas: u64) {
        self.gas.add_equality_constraint(gas);
    }

    pub fn add_gas_refund_min(&mut self, min: i128) {
        self.gas_refund.add_lower_boundary(min);
    }

    pub fn add_gas_refund_max(&mut self, max: i128) {
        self.gas_refund.add_upper_boundary(max);
    }

    pub fn set_gas_refund(&mut self, refund: i128) {
        self.gas_refund.add_equality_constraint(refund);
    }

    pub fn bind(&mut self, var: Variable, value: U256) {
        self.bindings.push((var, value));
    }

    pub fn set_self_address(&mut self, addr: Address) {
        self.self_address_const.push(addr);
    }

    pub fn bind_to_self_address(&mut self, var: Variable) {
        self.self_address_var.push(var);
    }

    /* ---- sub-generator accessors (builder-style delegation) ---- */

    pub fn code_mut(&mut self) -> &mut CodeGenerator {
        &mut self.code
    }

    pub fn stack_mut(&mut self) -> &mut StackGenerator {
        &mut self.stack
    }

    pub fn storage_mut(&mut self) -> &mut StorageGenerator {
        &mut self.storage
    }

    pub fn transient_storage_mut(&mut self) -> &mut TransientStorageGenerator {
        &mut self.transient_storage
    }

    pub fn accounts_mut(&mut self) -> &mut AccountsGenerator {
        &mut self.accounts
    }

    pub fn block_context_mut(&mut self) -> &mut BlockContextGenerator {
        &mut self.block_context
    }

    pub fn call_context_mut(&mut self) -> &mut CallContextGenerator {
        &mut self.call_context
    }

    pub fn call_journal_mut(&mut self) -> &mut CallJournalGenerator {
        &mut self.call_journal
    }

    pub fn transaction_context_mut(&mut self) -> &mut TransactionContextGenerator {
        &mut self.transaction_context
    }

    pub fn self_destructed_mut(&mut self) -> &mut SelfDestructedGenerator {
        &mut self.self_destructed
    }

    /// spec.md §4.11's thirteen-step `Generate`.
    #[instrument(level = "debug", skip(self, rng))]
    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<State, GenerateError> {
        // 1. Apply variable bindings.
        let mut assignment = Assignment::new();
        for (var, value) in &self.bindings {
            if !assignment.bind(var.clone(), *value) {
                return Err(UnsatisfiableReason::conflict("bindings", format!("{var} pre-assigned twice")).into());
            }
        }

        // 2. Status.
        let status = resolve_singleton(&self.status, "status")?.unwrap_or(Status::Running);

        // 3. Code (may introduce new assignments).
        let code = self.code.generate(&mut assignment, rng)?;

        // 4. Read-only.
        let read_only = resolve_singleton(&self.read_only, "read_only")?.unwrap_or(false);

        // 5. PC. Only `StackGenerator` may raise `UnboundVariable` (spec.md
        // §7); every other stage, this one included, binds an unbound
        // variable on demand instead of erroring.
        let mut pc_values: BTreeSet<u64> = self.pc_const.iter().copied().collect();
        let mut unbound_pc_vars: Vec<&Variable> = Vec::new();
        for var in &self.pc_var {
            if let Some(value) = assignment.get(var) {
                pc_values.insert(u64_from_u256(value, "pc")?);
            } else {
                unbound_pc_vars.push(var);
            }
        }
        let pc = resolve_singleton(&pc_values.into_iter().collect::<Vec<_>>(), "pc")?
            .map(Ok)
            .unwrap_or_else(|| -> Result<u64, GenerateError> {
                if code.length() == 0 {
                    Ok(0)
                } else {
                    let mut solver = RangeSolver::new(0u64, code.length() as u64 - 1);
                    solver.generate(rng)
                }
            })?;
        for var in unbound_pc_vars {
            if !assignment.bind(var.clone(), U256::from(pc)) {
                return Err(UnsatisfiableReason::conflict("pc", format!("{var} already bound to a different value")).into());
            }
        }

        // 6. Gas and gas refund.
        let gas = self.gas.generate(rng)?;
        let gas_refund = self.gas_refund.generate(rng)?;

        // 7. Self-address.
        let self_address = resolve_self_address(&self.self_address_const, &self.self_address_var, &mut assignment, rng)?;

        // 8. CallContext, CallJournal.
        let call_context = self.call_context.generate(rng)?;
        let call_journal = self.call_journal.generate(rng)?;

        // 9. Random call-data / last-call-return-data.
        use rand::Rng;
        let call_data = random_bytes(rng, rng.gen_range(0..=MAX_AUX_DATA_LEN));
        let last_call_return_data = random_bytes(rng, rng.gen_range(0..=MAX_AUX_DATA_LEN));

        // 10. SelfDestructed.
        let self_destructed = self.self_destructed.generate(rng)?;

        // 11. Recent block hashes: 256 distinct random hashes.
        let mut seen_hashes = BTreeSet::new();
        let mut recent_block_hashes = Vec::with_capacity(256);
        while recent_block_hashes.len() < 256 {
            let h = Hash::random(rng);
            if seen_hashes.insert(h) {
                recent_block_hashes.push(h);
            }
        }

        // 12. Storage, TransientStorage, Accounts, Memory, TransactionContext,
        // BlockContext, Stack — in that order.
        let storage = self.storage.generate(&mut assignment, rng)?;
        let transient_storage = self.transient_storage.generate(&mut assignment, rng)?;
        let accounts = self.accounts.generate(self_address, &mut assignment, rng)?;
        let memory = self.memory.generate(rng)?;
        let transaction_context = self.transaction_context.generate(&mut assignment, rng)?;
        let block_context = self.block_context.generate(&mut assignment, rng)?;
        let stack = self.stack.generate(&assignment, rng)?;

        // 13. Derive revision from the drawn block number (already computed
        // inside BlockContextGenerator::generate, kept here for clarity).
        let revision = revision_for_block(block_context.block_number);
        debug_assert_eq!(revision, block_context.revision);

        Ok(State {
            status,
            revision,
            pc,
            gas,
            gas_refund,
            read_only,
            self_address,
            self_destructed,
            code,
            stack,
            memory,
            storage,
            transient_storage,
            accounts,
            block_context,
            call_context,
            call_journal,
            transaction_context,
            call_data,
            last_call_return_data,
            recent_block_hashes,
        })
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

fn resolve_singleton<T>(values: &[T], field: &'static str) -> Result<Option<T>, GenerateError>
where
    T: Copy + Eq + std::hash::Hash + fmt::Debug,
{
    let distinct: Vec<T> = values.iter().copied().unique().collect();
    match distinct.len() {
        0 => Ok(None),
        1 => Ok(Some(distinct[0])),
        _ => Err(UnsatisfiableReason::conflict(field, format!("{distinct:?} are mutually exclusive")).into()),
    }
}

fn u64_from_u256(v: U256, field: &'static str) -> Result<u64, GenerateError> {
    if v > U256::from(u64::MAX) {
        return Err(UnsatisfiableReason::out_of_range(field, format!("{v:#x} does not fit in 64 bits")).into());
    }
    Ok(v.as_u64())
}

fn resolve_self_address(
    consts: &[Address],
    vars: &[Variable],
    assignment: &mut Assignment,
    rng: &mut dyn RngCore,
) -> Result<Address, GenerateError> {
    let mut distinct_consts: Vec<Address> = Vec::new();
    for &a in consts {
        if !distinct_consts.contains(&a) {
            distinct_consts.push(a);
        }
    }
    if distinct_consts.len() > 1 {
        return Err(UnsatisfiableReason::conflict("self_address", "more than one constant self-address").into());
    }

    let mut pre_assigned: Option<Address> = None;
    for var in vars {
        if let Some(v) = assignment.get(var) {
            let addr = address_from_u256(v);
            match pre_assigned {
                Some(existing) if existing != addr => {
                    return Err(UnsatisfiableReason::conflict("self_address", "pre-assigned variables disagree").into());
                }
                _ => pre_assigned = Some(addr),
            }
        }
    }

    if let (Some(c), Some(p)) = (distinct_consts.first(), pre_assigned) {
        if *c != p {
            return Err(UnsatisfiableReason::conflict("self_address", "constant and pre-assigned variable disagree").into());
        }
    }

    let self_address = distinct_consts
        .first()
        .copied()
        .or(pre_assigned)
        .unwrap_or_else(|| Address::random(rng));

    for var in vars {
        if !assignment.bind(var.clone(), u256_from_address(self_address)) {
            return Err(UnsatisfiableReason::conflict("self_address", format!("{var} already bound to a different value")).into());
        }
    }

    Ok(self_address)
}

impl fmt::Display for StateGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for s in &self.status {
            parts.push(format!("status={s:?}"));
        }
        for r in &self.read_only {
            parts.push(format!("readOnly={r}"));
        }
        for pc in &self.pc_const {
            parts.push(format!("pc={pc}"));
        }
        for var in &self.pc_var {
            parts.push(format!("pc={var}"));
        }
        parts.push(format!("gas: {}", self.gas));
        parts.push(format!("gasRefund: {}", self.gas_refund));
        for addr in &self.self_address_const {
            parts.push(format!("selfAddress={addr}"));
        }
        for var in &self.self_address_var {
            parts.push(format!("selfAddress={var}"));
        }
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::{ADD, STOP};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn conflicting_status_is_unsatisfiable() {
        let mut g = StateGenerator::new();
        g.set_status(Status::Running);
        g.set_status(Status::Failed);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(g.generate(&mut rng).is_err());
    }

    #[test]
    fn conflicting_push2_then_stop_is_unsatisfiable() {
        let mut g = StateGenerator::new();
        g.code_mut().set_operation(4, crate::evm::PUSH2);
        g.code_mut().set_operation(5, STOP);
        let mut rng = StdRng::seed_from_u64(2);
        assert!(g.generate(&mut rng).is_err());
    }

    #[test]
    fn add_operation_succeeds_with_empty_assignment() {
        let mut g = StateGenerator::new();
        g.code_mut().add_operation(Variable::new("A"), STOP);
        g.code_mut().add_operation(Variable::new("B"), ADD);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(g.generate(&mut rng).is_ok());
    }

    #[test]
    fn bind_to_self_address_twice_succeeds() {
        let mut g = StateGenerator::new();
        g.bind_to_self_address(Variable::new("Y"));
        g.bind_to_self_address(Variable::new("Y"));
        let mut rng = StdRng::seed_from_u64(4);
        assert!(g.generate(&mut rng).is_ok());
    }

    #[test]
    fn unbound_pc_var_is_bound_to_resolved_pc_for_downstream_reuse() {
        use crate::evm::StorageStatus;

        let mut g = StateGenerator::new();
        let p = Variable::new("P");
        g.bind_pc(p.clone());
        // Reusing `p` as a storage key lets us observe, from the public
        // `State` surface, that PC resolution actually bound it (storage is
        // resolved after PC, so it reads the same assignment entry back).
        g.storage_mut().bind_storage_configuration(StorageStatus::Assigned, p, Variable::new("nv"));
        let mut rng = StdRng::seed_from_u64(5);
        let state = g.generate(&mut rng).unwrap();
        assert!(state.storage.get(U256::from(state.pc)).is_some());
    }

    #[test]
    fn restore_leaves_display_unchanged() {
        use pretty_assertions::assert_eq;

        let mut g = StateGenerator::new();
        g.add_gas_min(10);
        g.code_mut().add_operation(Variable::new("A"), STOP);
        let snapshot = g.clone_store();
        let before = g.to_string();
        g.add_gas_max(20);
        g.code_mut().add_operation(Variable::new("B"), ADD);
        g.restore(&snapshot);
        assert_eq!(g.to_string(), before);
    }
}
