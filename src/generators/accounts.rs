//! spec.md §4.8 — `AccountsGenerator`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use primitive_types::U256;
use rand::{Rng, RngCore};

use crate::error::{GenerateError, UnsatisfiableReason};
use crate::evm::{address_from_u256, random_bytes, random_u256, u256_from_address, Address};
use crate::rand_util::fresh_value;
use crate::solver::RangeSolver;
use crate::state::{Account, Accounts};
use crate::variable::{Assignment, Variable};

/// Maximum number of undirected decoy accounts (spec.md §4.8 step 5).
pub const MAX_DECOY_ACCOUNTS: usize = 4;

/// Largest code body a generated non-empty account receives.
const MAX_ACCOUNT_CODE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emptiness {
    Empty,
    NonEmpty,
}

#[derive(Debug, Clone, Default)]
pub struct AccountsGenerator {
    warm_cold: BTreeMap<Variable, bool>,
    emptiness: BTreeMap<Variable, Emptiness>,
    balance: BTreeMap<Variable, RangeSolver<U256>>,
    unsatisfiable: bool,
}

impl AccountsGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_warm(&mut self, addr: Variable, warm: bool) {
        match self.warm_cold.get(&addr) {
            Some(&existing) if existing != warm => self.unsatisfiable = true,
            _ => {
                self.warm_cold.insert(addr, warm);
            }
        }
    }

    pub fn bind_empty(&mut self, addr: Variable) {
        self.bind_emptiness(addr, Emptiness::Empty);
    }

    pub fn bind_non_empty(&mut self, addr: Variable) {
        self.bind_emptiness(addr, Emptiness::NonEmpty);
    }

    fn bind_emptiness(&mut self, addr: Variable, e: Emptiness) {
        match self.emptiness.get(&addr) {
            Some(existing) if *existing != e => self.unsatisfiable = true,
            _ => {
                self.emptiness.insert(addr, e);
            }
        }
    }

    pub fn bind_balance_min(&mut self, addr: Variable, min: U256) {
        self.balance.entry(addr).or_insert_with(RangeSolver::full).add_lower_boundary(min);
    }

    pub fn bind_balance_max(&mut self, addr: Variable, max: U256) {
        self.balance.entry(addr).or_insert_with(RangeSolver::full).add_upper_boundary(max);
    }

    /// spec.md §4.8 step 4: self-address always receives a random balance
    /// and code, resolved ahead of decoy accounts (Open Question
    /// resolution, recorded in DESIGN.md: self-address is not just another
    /// variable, it is guaranteed present in the account set).
    pub fn generate(
        &self,
        self_address: Address,
        assignment: &mut Assignment,
        rng: &mut dyn RngCore,
    ) -> Result<Accounts, GenerateError> {
        if self.unsatisfiable {
            return Err(UnsatisfiableReason::conflict("accounts", "conflicting warm/empty constraints").into());
        }

        let mut used: BTreeSet<Address> = BTreeSet::new();
        used.insert(self_address);
        let mut accounts = Accounts::new();
        accounts.insert(self_address, Account { balance: random_u256(rng), code: random_bytes(rng, 32), warm: true });

        let mut all_vars: BTreeSet<Variable> = self.warm_cold.keys().cloned().collect();
        all_vars.extend(self.emptiness.keys().cloned());
        all_vars.extend(self.balance.keys().cloned());

        for addr_var in &all_vars {
            let address = if let Some(bound) = assignment.get(addr_var).map(address_from_u256) {
                bound
            } else {
                fresh_value(rng, |rng| Address::random(rng), |a| used.contains(a))?
            };
            if !assignment.bind(addr_var.clone(), u256_from_address(address)) {
                return Err(UnsatisfiableReason::conflict("accounts", format!("{addr_var} already bound")).into());
            }
            used.insert(address);

            let warm = self.warm_cold.get(addr_var).copied().unwrap_or_else(|| rng.gen_bool(0.5));

            let account = match self.emptiness.get(addr_var) {
                Some(Emptiness::Empty) => {
                    if let Some(range) = self.balance.get(addr_var) {
                        if range.min() > U256::zero() {
                            return Err(UnsatisfiableReason::conflict(
                                "accounts",
                                format!("{addr_var} must be empty but balance range excludes zero"),
                            )
                            .into());
                        }
                    }
                    Account { balance: U256::zero(), code: Vec::new(), warm }
                }
                Some(Emptiness::NonEmpty) => {
                    let has_explicit_range = self.balance.contains_key(addr_var);
                    let range = self.balance.get(addr_var).copied().unwrap_or_else(RangeSolver::full);
                    // spec.md §4.8: non-empty accounts get one of non-zero
                    // balance only / non-zero code only / both, chosen
                    // randomly, unless an explicit balance bound already
                    // forces the shape.
                    let want_code = has_explicit_range || rng.gen_bool(2.0 / 3.0);
                    let want_balance = !has_explicit_range && (!want_code || rng.gen_bool(0.5));
                    let balance = if want_balance {
                        let mut forced = range;
                        if forced.min() == U256::zero() {
                            forced.add_lower_boundary(U256::one());
                        }
                        forced.generate(rng)?
                    } else if has_explicit_range {
                        range.generate(rng)?
                    } else {
                        U256::zero()
                    };
                    let code = if want_code {
                        random_bytes(rng, 1 + rng.gen_range(0..MAX_ACCOUNT_CODE_LEN))
                    } else {
                        Vec::new()
                    };
                    Account { balance, code, warm }
                }
                None => {
                    if let Some(range) = self.balance.get(addr_var) {
                        let balance = range.generate(rng)?;
                        Account { balance, code: Vec::new(), warm }
                    } else {
                        Account { balance: U256::zero(), code: Vec::new(), warm }
                    }
                }
            };
            accounts.insert(address, account);
        }

        let decoys = rng.gen_range(0..=MAX_DECOY_ACCOUNTS);
        for _ in 0..decoys {
            let address = fresh_value(rng, |rng| Address::random(rng), |a| used.contains(a))?;
            used.insert(address);
            let warm = rng.gen_bool(0.5);
            let has_code = rng.gen_bool(0.5);
            let code = if has_code { random_bytes(rng, 1 + rng.gen_range(0..MAX_ACCOUNT_CODE_LEN)) } else { Vec::new() };
            accounts.insert(address, Account { balance: random_u256(rng), code, warm });
        }

        Ok(accounts)
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for AccountsGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (v, w) in &self.warm_cold {
            parts.push(format!("{}({v})", if *w { "warm" } else { "cold" }));
        }
        for (v, e) in &self.emptiness {
            parts.push(format!("{v}={}", if *e == Emptiness::Empty { "empty" } else { "non-empty" }));
        }
        for (v, r) in &self.balance {
            parts.push(format!("balance[{v}]: {r}"));
        }
        write!(f, "{}", parts.join(","))
    }
}
