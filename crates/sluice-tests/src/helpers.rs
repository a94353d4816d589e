//! Shared helpers for integration tests.

use sluice_core::bank::{MemoryBank, MemoryResolver};
use sluice_core::config::EscrowConfig;
use sluice_core::constants::{COIN, EPOCH_DURATION, REWARD_PRECISION};
use sluice_core::types::{AccountId, Asset, RecordId, RewardKind};
use sluice_escrow::Escrow;

pub type TestEscrow = Escrow<MemoryBank, MemoryResolver>;

/// One week.
pub const W: u64 = EPOCH_DURATION;
/// Epoch-aligned genesis used by every suite.
pub const GENESIS: u64 = 2_800 * W;
/// Reward kind used when a test needs just one.
pub const KIND: RewardKind = RewardKind(1);

/// Account from a seed byte.
pub fn acct(seed: u8) -> AccountId {
    AccountId([seed; 32])
}

/// The distributor authorized in [`funded_escrow`].
pub fn distributor() -> AccountId {
    acct(0xD0)
}

/// Escrow at [`GENESIS`] with `distributor()` authorized, every seed in
/// `holders` holding `tokens` locked-asset tokens, and the distributor
/// holding a large balance of [`KIND`].
pub fn funded_escrow(config: EscrowConfig, holders: &[u8], tokens: u128) -> TestEscrow {
    let config = EscrowConfig {
        distributors: vec![distributor()],
        ..config
    };
    let mut escrow = Escrow::new(config, GENESIS, MemoryBank::new(), MemoryResolver::new())
        .expect("valid test config");
    for &seed in holders {
        escrow.bank_mut().credit(Asset::Locked, acct(seed), tokens * COIN);
    }
    escrow
        .bank_mut()
        .credit(Asset::Reward(KIND), distributor(), 1_000_000_000 * COIN);
    escrow
}

/// Create a permanent lock of `tokens` for `seed` at `now`.
pub fn permanent_lock(escrow: &mut TestEscrow, seed: u8, tokens: u128, now: u64) -> RecordId {
    let id = escrow
        .create_lock(acct(seed), tokens * COIN, W, now)
        .expect("create lock");
    escrow.lock_permanent(acct(seed), id, now).expect("lock permanent");
    id
}

/// Paid-out rewards plus carried remainders of `kind`, in scaled units.
pub fn distributed_scaled(escrow: &TestEscrow, kind: RewardKind, owners: &[AccountId]) -> u128 {
    let paid: u128 = owners
        .iter()
        .map(|o| escrow.bank().balance(Asset::Reward(kind), o))
        .sum();
    let carried: u128 = escrow
        .records()
        .map(|r| escrow.claim_state(kind, r.id).map(|s| s.remainder).unwrap_or(0))
        .sum();
    paid * REWARD_PRECISION + carried
}
