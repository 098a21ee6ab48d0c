//! The "consumed external interfaces" of spec.md §6, implemented in-crate.
//!
//! Everything in this module plays the role `fuel-asm`/`fuel-types` play
//! for `fuel-vm`: stable, logic-free primitives that the generator is built
//! on top of. None of it synthesizes or constrains anything; it only
//! describes the shape of the EVM and the fork schedule.

use std::fmt;

pub use primitive_types::U256;
use rand::RngCore;

/// 20-byte account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn random(rng: &mut (impl RngCore + ?Sized)) -> Self {
        let mut buf = [0u8; 20];
        rng.fill_bytes(&mut buf);
        Self(buf)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Widen a 20-byte address into the 32-byte [`U256`] space storage/balance
/// constraints live in (zero-padded in the high bytes, big-endian).
pub fn u256_from_address(addr: Address) -> U256 {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(&addr.0);
    U256::from_big_endian(&buf)
}

/// Inverse of [`u256_from_address`]: truncate to the low 20 bytes.
pub fn address_from_u256(v: U256) -> Address {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&buf[12..]);
    Address(addr)
}

/// 32-byte opaque hash (block hash, code hash, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn random(rng: &mut (impl RngCore + ?Sized)) -> Self {
        let mut buf = [0u8; 32];
        rng.fill_bytes(&mut buf);
        Self(buf)
    }
}

/// Draw a random [`U256`] by reading 32 raw bytes, the "raw word read" path
/// spec.md §4.1/§4.2 calls for when a domain spans its whole representable
/// range.
pub fn random_u256(rng: &mut (impl RngCore + ?Sized)) -> U256 {
    let mut buf = [0u8; 32];
    rng.fill_bytes(&mut buf);
    U256::from_big_endian(&buf)
}

/// Random byte string of length `len`.
pub fn random_bytes(rng: &mut (impl RngCore + ?Sized), len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/* ---------------------------------------------------------------------- */
/* OpCode table                                                           */
/* ---------------------------------------------------------------------- */

/// A single EVM instruction byte.
pub type OpCode = u8;

pub const STOP: OpCode = 0x00;
pub const ADD: OpCode = 0x01;
pub const JUMPDEST: OpCode = 0x5b;
pub const PUSH1: OpCode = 0x60;
pub const PUSH2: OpCode = 0x61;
pub const PUSH32: OpCode = 0x7f;
pub const INVALID: OpCode = 0xfe;

/// `true` iff `op` is one of `PUSH1..PUSH32`.
pub const fn is_push(op: OpCode) -> bool {
    op >= PUSH1 && op <= PUSH32
}

/// Number of data bytes `op` reserves, for `op` a `PUSH_k`. Panics (in
/// debug) if `op` is not a PUSH opcode; callers are expected to guard with
/// [`is_push`] first, matching the "externally supplied, assumed correct"
/// contract of spec.md §6.
pub const fn push_width(op: OpCode) -> u8 {
    debug_assert!(is_push(op));
    op - PUSH1 + 1
}

/// A representative, non-exhaustive set of opcodes that are valid
/// non-PUSH instructions, used wherever a sub-generator needs "some code
/// op" (spec.md §4.3.1 Pass B).
pub const VALID_NON_PUSH_OPCODES: &[OpCode] = &[
    STOP, ADD, 0x02 /* MUL */, 0x03 /* SUB */, 0x10 /* LT */, 0x11 /* GT */,
    0x14 /* EQ */, 0x15 /* ISZERO */, 0x16 /* AND */, 0x17 /* OR */, 0x18 /* XOR */,
    0x19 /* NOT */, 0x50 /* POP */, JUMPDEST, 0x54 /* SLOAD */, 0x55 /* SSTORE */,
    0x56 /* JUMP */, 0x57 /* JUMPI */, 0x5a /* GAS */,
];

/// Draw a uniformly random byte and interpret it as an opcode.
pub fn random_opcode(rng: &mut (impl RngCore + ?Sized)) -> OpCode {
    let mut buf = [0u8; 1];
    rng.fill_bytes(&mut buf);
    buf[0]
}

/* ---------------------------------------------------------------------- */
/* Revision / fork-block table                                           */
/* ---------------------------------------------------------------------- */

/// A named EVM protocol revision. Ordered: earlier revisions come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::EnumIter, strum::EnumCount)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Revision {
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
    Cancun,
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Block at which `rev` becomes active.
pub const fn fork_block(rev: Revision) -> u64 {
    match rev {
        Revision::Istanbul => 0,
        Revision::Berlin => 1_000_000,
        Revision::London => 2_000_000,
        Revision::Paris => 3_000_000,
        Revision::Shanghai => 4_000_000,
        Revision::Cancun => 5_000_000,
    }
}

/// Length, in blocks, of `rev`'s active range (i.e. until the next fork, or
/// a generous open span for the latest known revision).
pub fn range_length(rev: Revision) -> u64 {
    use strum::IntoEnumIterator;
    let start = fork_block(rev);
    Revision::iter()
        .map(fork_block)
        .filter(|&b| b > start)
        .min()
        .map(|next| next - start)
        .unwrap_or(u64::MAX - start)
}

/// The revision active at block `bn`.
pub fn revision_for_block(bn: u64) -> Revision {
    use strum::IntoEnumIterator;
    Revision::iter()
        .rev()
        .find(|&rev| fork_block(rev) <= bn)
        .unwrap_or(Revision::Istanbul)
}

/* ---------------------------------------------------------------------- */
/* Storage status classification (EIP-2200 / EIP-3529)                   */
/* ---------------------------------------------------------------------- */

/// Classification of a storage-slot transition, computed from
/// `(original, current, new)` per EIP-2200/3529 (spec.md §4.6, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageStatus {
    Added,
    AddedDeleted,
    DeletedRestored,
    DeletedAdded,
    Deleted,
    Modified,
    ModifiedDeleted,
    ModifiedRestored,
    Assigned,
}

/// Total function from `(original, current, new)` to [`StorageStatus`],
/// inverting the table in spec.md §4.6. Every triple this crate's own
/// `StorageGenerator` produces satisfies exactly one row of that table, so
/// the degenerate `current == original == new` branch below (not listed in
/// the table; real EIP-2200 calls it a no-op) is unreachable in practice —
/// it is handled only so the function stays total.
pub fn classify_storage_status(original: U256, current: U256, new: U256) -> StorageStatus {
    use StorageStatus::*;
    let zero = U256::zero();
    if original == zero {
        if current == zero {
            Added
        } else {
            AddedDeleted
        }
    } else if current == zero {
        if new == original {
            DeletedRestored
        } else {
            DeletedAdded
        }
    } else if current == original {
        if new == zero {
            Deleted
        } else if new == original {
            Assigned
        } else {
            Modified
        }
    } else if new == zero {
        ModifiedDeleted
    } else if new == original {
        ModifiedRestored
    } else {
        Assigned
    }
}

/// `true` iff `status` requires the new value to be zero.
pub fn status_requires_zero_new(status: StorageStatus) -> bool {
    matches!(status, StorageStatus::AddedDeleted | StorageStatus::Deleted | StorageStatus::ModifiedDeleted)
}
