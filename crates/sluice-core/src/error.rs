//! Error types for the Sluice ledger.
use thiserror::Error;

use crate::types::{AccountId, Asset, RecordId, RewardKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be non-zero")] ZeroAmount,
    #[error("invalid lock duration {duration}s: end {end} is not after now {now}")] InvalidDuration { duration: u64, end: u64, now: u64 },
    #[error("new end {requested} must be later than current end {current}")] EndNotExtended { requested: u64, current: u64 },
    #[error("length mismatch: {left} != {right}")] LengthMismatch { left: usize, right: usize },
    #[error("empty batch")] EmptyBatch,
    #[error("batch too large: {size} > {max}")] BatchTooLarge { size: usize, max: usize },
    #[error("locked supply cap exceeded: {requested} > {max}")] SupplyCapExceeded { requested: u128, max: u128 },
    #[error("split amount {amount} must be strictly between 0 and {total}")] InvalidSplitAmount { amount: u128, total: u128 },
    #[error("cannot merge record {0} into itself")] SelfMerge(RecordId),
    #[error("unknown reward kind: {0}")] UnknownRewardKind(RewardKind),
    #[error("claim spans {requested} epochs, max {max} per call")] TooManyEpochs { requested: u64, max: u64 },
    #[error("invalid config: {0}")] InvalidConfig(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("{caller} is neither owner nor approved for record {record}")] NotOwnerOrApproved { record: RecordId, caller: AccountId },
    #[error("{caller} is not the owner of record {record}")] NotOwner { record: RecordId, caller: AccountId },
    #[error("{0} is not an authorized distributor")] NotDistributor(AccountId),
    #[error("split not permitted for {0}")] SplitNotPermitted(AccountId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("record not found: {0}")] RecordNotFound(RecordId),
    #[error("record {0} is terminal")] RecordTerminal(RecordId),
    #[error("record {record} expired at {end} (now {now})")] Expired { record: RecordId, end: u64, now: u64 },
    #[error("record {record} not expired until {end} (now {now})")] NotExpired { record: RecordId, end: u64, now: u64 },
    #[error("record {0} is permanent")] Permanent(RecordId),
    #[error("record {0} is not permanent")] NotPermanent(RecordId),
    #[error("record {from} cannot merge into {to}: lock terms differ")] MergeTermsMismatch { from: RecordId, to: RecordId },
    #[error("self-repay already enabled for record {0}")] OverrideAlreadyEnabled(RecordId),
    #[error("self-repay not enabled for record {0}")] OverrideNotEnabled(RecordId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemporalError {
    #[error("claim timestamp {ts} is in the future (now {now})")] FutureTimestamp { ts: u64, now: u64 },
    #[error("clock regression: now {now} < last checkpoint {last}")] ClockRegression { now: u64, last: u64 },
    #[error("global checkpoint reached {reached}, behind now {now}; call checkpoint again")] CheckpointBehind { reached: u64, now: u64 },
    #[error("replay from {from} to {to} exceeds {max_steps} steps; checkpoint first")] ReplayBoundExceeded { from: u64, to: u64, max_steps: u64 },
}

/// Arithmetic invariant violations. Reaching one indicates a ledger bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConservationError {
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error("negative bias: {0}")] NegativeBias(i128),
    #[error("locked supply mismatch: tracked {tracked}, summed {summed}")] SupplyMismatch { tracked: u128, summed: u128 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient {asset} balance for {account}: have {have}, need {need}")] InsufficientBalance { account: AccountId, asset: Asset, have: u128, need: u128 },
    #[error("insufficient {asset} custody: have {have}, need {need}")] InsufficientCustody { asset: Asset, have: u128, need: u128 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    #[error("no receiver available for owner {0}")] Unavailable(AccountId),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error(transparent)] Validation(#[from] ValidationError),
    #[error(transparent)] Authorization(#[from] AuthorizationError),
    #[error(transparent)] State(#[from] StateError),
    #[error(transparent)] Temporal(#[from] TemporalError),
    #[error(transparent)] Conservation(#[from] ConservationError),
    #[error(transparent)] Transfer(#[from] TransferError),
    #[error(transparent)] Resolver(#[from] ResolverError),
    #[error("snapshot: {0}")] Snapshot(String),
}
