//! The concrete state containers spec.md §6 lists as externally supplied.
//! Plain data; no generation logic lives here.

use std::collections::BTreeMap;

use crate::evm::{Address, Hash, Revision, U256};

/// A generated EVM bytecode string, plus the per-byte `isCode`/`isData`
/// classification spec.md §4.3 requires ("PUSH data bytes are not
/// operations").
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Code {
    bytes: Vec<u8>,
    /// `is_code[i]` iff byte `i` is an instruction (as opposed to PUSH
    /// data).
    is_code: Vec<bool>,
}

impl Code {
    pub fn new(bytes: Vec<u8>, is_code: Vec<bool>) -> Self {
        debug_assert_eq!(bytes.len(), is_code.len());
        Self { bytes, is_code }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_code(&self, pos: usize) -> bool {
        self.is_code.get(pos).copied().unwrap_or(false)
    }

    pub fn is_data(&self, pos: usize) -> bool {
        pos < self.bytes.len() && !self.is_code(pos)
    }

    pub fn get(&self, pos: usize) -> Option<u8> {
        self.bytes.get(pos).copied()
    }
}

/// An EVM operand stack of fixed, generated size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stack {
    values: Vec<U256>,
}

impl Stack {
    pub fn new(values: Vec<U256>) -> Self {
        Self { values }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, pos: usize) -> Option<U256> {
        self.values.get(pos).copied()
    }

    pub fn values(&self) -> &[U256] {
        &self.values
    }
}

/// Random, 32-byte-aligned EVM memory (spec.md §4.5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len() % 32, 0);
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A single storage slot's `(original, current)` pair and warm/cold flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageSlot {
    pub original: U256,
    pub current: U256,
    pub warm: bool,
}

/// Contract storage: a map of key to `(original, current, warm)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Storage {
    slots: BTreeMap<U256, StorageSlot>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: U256, slot: StorageSlot) {
        self.slots.insert(key, slot);
    }

    pub fn get(&self, key: U256) -> Option<StorageSlot> {
        self.slots.get(&key).copied()
    }

    pub fn contains_key(&self, key: U256) -> bool {
        self.slots.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&U256, &StorageSlot)> {
        self.slots.iter()
    }
}

/// Transient storage (EIP-1153): a map of key to value, present only for
/// keys that were written during the (symbolic) transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransientStorage {
    slots: BTreeMap<U256, U256>,
}

impl TransientStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: U256, value: U256) {
        self.slots.insert(key, value);
    }

    pub fn get(&self, key: U256) -> U256 {
        self.slots.get(&key).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&U256, &U256)> {
        self.slots.iter()
    }
}

/// A single account's balance/code/warm state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Account {
    pub balance: U256,
    pub code: Vec<u8>,
    pub warm: bool,
}

impl Account {
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.code.is_empty()
    }
}

/// The set of accounts touched by the symbolic state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Accounts {
    accounts: BTreeMap<Address, Account>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, account: Account) {
        self.accounts.insert(address, account);
    }

    pub fn get(&self, address: Address) -> Option<&Account> {
        self.accounts.get(&address)
    }

    pub fn contains(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }
}

/// Block-level execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockContext {
    pub block_number: u64,
    pub revision: Revision,
    pub chain_id: u64,
    pub coinbase: Address,
    pub gas_limit: u64,
    pub base_fee: U256,
    pub blob_base_fee: U256,
    pub gas_price: U256,
    pub prev_randao: Hash,
    pub timestamp: u64,
}

/// Call-level execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallContext {
    pub caller: Address,
    pub call_value: U256,
    pub is_static: bool,
    pub depth: u32,
}

/// The journal of calls made so far in the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CallJournal {
    pub call_count: u32,
    pub last_call_succeeded: bool,
}

/// Transaction-level context.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransactionContext {
    pub origin: Address,
    pub gas_price: U256,
    pub blob_hashes: Vec<Hash>,
}

/// The fully synthesized, concrete EVM state spec.md §1 describes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    pub status: Status,
    pub revision: Revision,
    pub pc: u64,
    pub gas: u64,
    pub gas_refund: i128,
    pub read_only: bool,
    pub self_address: Address,
    pub self_destructed: bool,
    pub code: Code,
    pub stack: Stack,
    pub memory: Memory,
    pub storage: Storage,
    pub transient_storage: TransientStorage,
    pub accounts: Accounts,
    pub block_context: BlockContext,
    pub call_context: CallContext,
    pub call_journal: CallJournal,
    pub transaction_context: TransactionContext,
    pub call_data: Vec<u8>,
    pub last_call_return_data: Vec<u8>,
    pub recent_block_hashes: Vec<Hash>,
}

/// Execution status of the symbolic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Status {
    Running,
    Stopped,
    Reverted,
    Failed,
}
