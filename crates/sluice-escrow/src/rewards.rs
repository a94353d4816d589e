//! Epoch-scoped reward ledger.
//!
//! Rewards notified during an epoch become active at the next epoch
//! boundary `e` and are shared among records in proportion to their weight
//! at `e`. Weights are read as the records enter second `e`, so a lock
//! created, merged, or withdrawn at `e` itself does not move the shares of
//! `e` once some of them have been paid. Each record carries one
//! [`ClaimState`] per reward kind: a cursor (`last_earn_time`) and a
//! sub-unit remainder scaled by [`REWARD_PRECISION`].
//!
//! # Conservation
//!
//! Per-record shares are floored twice (weights, then the share itself), so
//! the sum paid plus carried for an epoch never exceeds its allocation.
//! Lifecycle events that retire a record go through [`RewardLedger::settle`],
//! which pays the pending whole amount and moves the remainder to wherever
//! the event says it belongs, so no carried fraction is lost.
//!
//! [`REWARD_PRECISION`]: sluice_core::constants::REWARD_PRECISION

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Included};

use serde::{Deserialize, Serialize};

use sluice_core::epoch::boundaries_between;
use sluice_core::error::{ConservationError, EscrowError, ValidationError};
use sluice_core::math::{split_remainder, ScaledAccumulator};
use sluice_core::types::{AccountId, RecordId, RewardKind};
use sluice_decay::CheckpointEngine;

use crate::positions::LockRecord;

/// Claim cursor for one `(kind, record)` pair.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ClaimState {
    /// Epoch boundaries at or before this time have been accounted for.
    pub last_earn_time: u64,
    /// Carried fraction, scaled by `REWARD_PRECISION`. May exceed one unit
    /// after a merge; the next earn normalizes it.
    pub remainder: u128,
}

/// Result of an earned computation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Earned {
    /// Whole base units claimable.
    pub amount: u128,
    /// Remainder to store after claiming `amount`.
    pub remainder: u128,
    /// Cursor to store after claiming.
    pub cursor: u64,
}

/// A reward paid out of custody.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RewardPayout {
    pub record: RecordId,
    pub kind: RewardKind,
    pub receiver: AccountId,
    pub amount: u128,
}

/// Lifecycle events that strand reward state on a record's old identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The record was merged into `into`.
    Merged { into: RecordId, into_created_at: u64 },
    /// The record was split into two new records with the given amounts.
    Split { parts: [(RecordId, u128); 2] },
    /// The record was withdrawn, early or not.
    Destroyed,
    /// The record changed owner.
    Transferred,
}

/// What [`RewardLedger::settle`] wants done: pay `payouts` to the source
/// record's receiver, then write `writes`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settlement {
    pub payouts: Vec<(RewardKind, u128)>,
    pub writes: Vec<(RewardKind, RecordId, ClaimState)>,
}

/// Allocations and claim cursors for every reward kind.
#[derive(Clone, Debug, Default, bincode::Encode, bincode::Decode)]
pub struct RewardLedger {
    kinds: BTreeSet<RewardKind>,
    /// Kind → epoch boundary → amount activating there.
    allocations: HashMap<RewardKind, BTreeMap<u64, u128>>,
    claims: HashMap<(RewardKind, RecordId), ClaimState>,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, kind: RewardKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Registered kinds, ascending.
    pub fn kinds(&self) -> impl Iterator<Item = RewardKind> + '_ {
        self.kinds.iter().copied()
    }

    pub fn require_registered(&self, kind: RewardKind) -> Result<(), ValidationError> {
        if self.is_registered(kind) {
            Ok(())
        } else {
            Err(ValidationError::UnknownRewardKind(kind))
        }
    }

    pub fn allocation(&self, kind: RewardKind, epoch: u64) -> u128 {
        self.allocations
            .get(&kind)
            .and_then(|a| a.get(&epoch))
            .copied()
            .unwrap_or(0)
    }

    /// Every non-empty allocation of `kind`, ascending by epoch.
    pub fn allocations(&self, kind: RewardKind) -> Vec<(u64, u128)> {
        self.allocations
            .get(&kind)
            .map(|a| a.iter().map(|(e, v)| (*e, *v)).collect())
            .unwrap_or_default()
    }

    /// New allocation totals at `epoch` after adding each `(kind, amount)`.
    /// Nothing is written; pass the result to
    /// [`commit_allocations`](Self::commit_allocations).
    pub fn stage_allocations(
        &self,
        items: &[(RewardKind, u128)],
        epoch: u64,
    ) -> Result<Vec<(RewardKind, u128)>, ConservationError> {
        let mut staged: BTreeMap<RewardKind, u128> = BTreeMap::new();
        for &(kind, amount) in items {
            let current = match staged.get(&kind) {
                Some(v) => *v,
                None => self.allocation(kind, epoch),
            };
            let next = current
                .checked_add(amount)
                .ok_or(ConservationError::ArithmeticOverflow)?;
            staged.insert(kind, next);
        }
        Ok(staged.into_iter().collect())
    }

    /// Register each kind (if new) and overwrite its allocation at `epoch`.
    pub fn commit_allocations(&mut self, staged: &[(RewardKind, u128)], epoch: u64) {
        for &(kind, total) in staged {
            self.kinds.insert(kind);
            self.allocations.entry(kind).or_default().insert(epoch, total);
        }
    }

    /// Stored claim state, if any.
    pub fn stored_claim(&self, kind: RewardKind, id: RecordId) -> Option<ClaimState> {
        self.claims.get(&(kind, id)).copied()
    }

    /// Claim state with the default cursor at the record's creation time.
    pub fn claim_state(&self, kind: RewardKind, id: RecordId, created_at: u64) -> ClaimState {
        self.stored_claim(kind, id).unwrap_or(ClaimState {
            last_earn_time: created_at,
            remainder: 0,
        })
    }

    /// Rewards of `kind` earned by record `id` over `(last_earn_time, upto]`.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::UnknownRewardKind`] for an unregistered kind
    /// - [`ValidationError::TooManyEpochs`] when the window spans more than
    ///   `max_epochs` boundaries; claim up to an earlier timestamp first
    /// - replay and arithmetic errors from the weight queries
    pub fn earned(
        &self,
        engine: &CheckpointEngine,
        kind: RewardKind,
        id: RecordId,
        created_at: u64,
        upto: u64,
        max_epochs: u64,
    ) -> Result<Earned, EscrowError> {
        self.require_registered(kind)?;
        let state = self.claim_state(kind, id, created_at);
        let from = state.last_earn_time;
        let mut acc = ScaledAccumulator::from_remainder(state.remainder);

        if upto > from {
            let spanned = boundaries_between(from, upto);
            if spanned > max_epochs {
                return Err(ValidationError::TooManyEpochs {
                    requested: spanned,
                    max: max_epochs,
                }
                .into());
            }
            if let Some(allocs) = self.allocations.get(&kind) {
                for (&epoch, &allocation) in allocs.range((Excluded(from), Included(upto))) {
                    let weight = engine.weight_entering(id, epoch);
                    if weight == 0 {
                        continue;
                    }
                    let total = engine.total_weight_entering(epoch)?;
                    acc.add_share(allocation, weight, total)?;
                }
            }
        }

        Ok(Earned {
            amount: acc.whole(),
            remainder: acc.fraction(),
            cursor: from.max(upto),
        })
    }

    /// Plan the settlement of `record` for `event` at `now` across every
    /// registered kind.
    pub fn settle(
        &self,
        engine: &CheckpointEngine,
        record: &LockRecord,
        event: LifecycleEvent,
        now: u64,
        max_epochs: u64,
    ) -> Result<Settlement, EscrowError> {
        let mut plan = Settlement::default();
        if event == LifecycleEvent::Transferred {
            return Ok(plan);
        }

        for kind in self.kinds() {
            let earned = self.earned(engine, kind, record.id, record.created_at, now, max_epochs)?;
            if earned.amount > 0 {
                plan.payouts.push((kind, earned.amount));
            }
            let drained = ClaimState {
                last_earn_time: earned.cursor,
                remainder: 0,
            };

            match event {
                LifecycleEvent::Destroyed => {
                    plan.writes.push((
                        kind,
                        record.id,
                        ClaimState {
                            last_earn_time: earned.cursor,
                            remainder: earned.remainder,
                        },
                    ));
                }
                LifecycleEvent::Merged { into, into_created_at } => {
                    let dest = self.claim_state(kind, into, into_created_at);
                    let remainder = dest
                        .remainder
                        .checked_add(earned.remainder)
                        .ok_or(ConservationError::ArithmeticOverflow)?;
                    plan.writes.push((kind, record.id, drained));
                    plan.writes.push((kind, into, ClaimState { remainder, ..dest }));
                }
                LifecycleEvent::Split { parts: [(first, a1), (second, a2)] } => {
                    let total = a1.checked_add(a2).ok_or(ConservationError::ArithmeticOverflow)?;
                    let (r1, r2) = split_remainder(earned.remainder, a1, total)?;
                    plan.writes.push((kind, record.id, drained));
                    plan.writes.push((kind, first, ClaimState { last_earn_time: now, remainder: r1 }));
                    plan.writes.push((kind, second, ClaimState { last_earn_time: now, remainder: r2 }));
                }
                LifecycleEvent::Transferred => {}
            }
        }
        Ok(plan)
    }

    /// Write claim states produced by [`earned`](Self::earned) or
    /// [`settle`](Self::settle).
    pub fn apply_writes(&mut self, writes: &[(RewardKind, RecordId, ClaimState)]) {
        for &(kind, id, state) in writes {
            self.claims.insert((kind, id), state);
        }
    }

    /// Sum of stored remainders for `kind`, in scaled units.
    pub fn total_remainder(&self, kind: RewardKind) -> u128 {
        self.claims
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, s)| s.remainder)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::constants::{COIN, EPOCH_DURATION, REWARD_PRECISION};
    use sluice_core::types::LockedBalance;

    const W: u64 = EPOCH_DURATION;
    const G: u64 = 100 * W;
    const KIND: RewardKind = RewardKind(1);

    fn record(id: u64, amount: u128) -> LockRecord {
        LockRecord {
            id: RecordId(id),
            owner: AccountId([id as u8; 32]),
            amount,
            end: 0,
            is_permanent: true,
            permanent_origin_end: 0,
            created_at: G,
            terminated_at: None,
        }
    }

    /// Permanent records A=8, B=6, C=1e6 tokens, created at genesis.
    fn worked_engine() -> CheckpointEngine {
        let mut engine = CheckpointEngine::new(G, 255);
        for (id, tokens) in [(1, 8), (2, 6), (3, 1_000_000)] {
            engine
                .record_change(RecordId(id), &LockedBalance::EMPTY, &LockedBalance::permanent(tokens * COIN), G)
                .unwrap();
        }
        engine
    }

    fn ledger_with(alloc: u128, epoch: u64) -> RewardLedger {
        let mut ledger = RewardLedger::new();
        let staged = ledger.stage_allocations(&[(KIND, alloc)], epoch).unwrap();
        ledger.commit_allocations(&staged, epoch);
        ledger
    }

    #[test]
    fn worked_scenario_share() {
        let engine = worked_engine();
        let ledger = ledger_with(1_000_000, G + W);
        let e = ledger.earned(&engine, KIND, RecordId(1), G, G + W, 520).unwrap();
        assert_eq!(e.amount, 7);
        assert_eq!(e.remainder, 999_888_001_567_978_048);
        assert_eq!(e.cursor, G + W);
    }

    #[test]
    fn allocation_not_active_before_boundary() {
        let engine = worked_engine();
        let ledger = ledger_with(1_000_000, G + W);
        let e = ledger.earned(&engine, KIND, RecordId(1), G, G + W - 1, 520).unwrap();
        assert_eq!(e.amount, 0);
        assert_eq!(e.remainder, 0);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let engine = worked_engine();
        let ledger = RewardLedger::new();
        let err = ledger.earned(&engine, KIND, RecordId(1), G, G + W, 520).unwrap_err();
        assert_eq!(err, EscrowError::Validation(ValidationError::UnknownRewardKind(KIND)));
    }

    #[test]
    fn epoch_bound_is_enforced() {
        let engine = worked_engine();
        let ledger = ledger_with(1, G + W);
        let err = ledger.earned(&engine, KIND, RecordId(1), G, G + 10 * W, 4).unwrap_err();
        assert_eq!(
            err,
            EscrowError::Validation(ValidationError::TooManyEpochs { requested: 10, max: 4 })
        );
        // A shorter window succeeds.
        ledger.earned(&engine, KIND, RecordId(1), G, G + 4 * W, 4).unwrap();
    }

    #[test]
    fn shares_never_exceed_allocation() {
        let engine = worked_engine();
        let alloc = 1_000_000;
        let ledger = ledger_with(alloc, G + W);
        let mut whole = 0;
        let mut scaled = 0;
        for id in 1..=3 {
            let e = ledger.earned(&engine, KIND, RecordId(id), G, G + W, 520).unwrap();
            whole += e.amount;
            scaled += e.remainder;
        }
        assert!(whole * REWARD_PRECISION + scaled <= alloc * REWARD_PRECISION);
    }

    #[test]
    fn settle_destroyed_keeps_remainder() {
        let engine = worked_engine();
        let ledger = ledger_with(1_000_000, G + W);
        let plan = ledger
            .settle(&engine, &record(1, 8 * COIN), LifecycleEvent::Destroyed, G + W, 520)
            .unwrap();
        assert_eq!(plan.payouts, vec![(KIND, 7)]);
        assert_eq!(
            plan.writes,
            vec![(KIND, RecordId(1), ClaimState { last_earn_time: G + W, remainder: 999_888_001_567_978_048 })]
        );
    }

    #[test]
    fn settle_merged_moves_remainder() {
        let engine = worked_engine();
        let mut ledger = ledger_with(1_000_000, G + W);
        let b = ledger.earned(&engine, KIND, RecordId(2), G, G + W, 520).unwrap();
        ledger.apply_writes(&[(KIND, RecordId(2), ClaimState { last_earn_time: b.cursor, remainder: b.remainder })]);

        let plan = ledger
            .settle(
                &engine,
                &record(1, 8 * COIN),
                LifecycleEvent::Merged { into: RecordId(2), into_created_at: G },
                G + W,
                520,
            )
            .unwrap();
        ledger.apply_writes(&plan.writes);
        let merged = ledger.stored_claim(KIND, RecordId(2)).unwrap();
        assert_eq!(merged.remainder, b.remainder + 999_888_001_567_978_048);
        assert_eq!(ledger.stored_claim(KIND, RecordId(1)).unwrap().remainder, 0);
    }

    #[test]
    fn settle_split_divides_remainder() {
        let engine = worked_engine();
        let ledger = ledger_with(1_000_000, G + W);
        let now = G + W + 5;
        let plan = ledger
            .settle(
                &engine,
                &record(1, 8 * COIN),
                LifecycleEvent::Split { parts: [(RecordId(4), 5 * COIN), (RecordId(5), 3 * COIN)] },
                now,
                520,
            )
            .unwrap();
        let r = 999_888_001_567_978_048u128;
        let r1 = r * 5 / 8;
        assert_eq!(
            &plan.writes[1..],
            &[
                (KIND, RecordId(4), ClaimState { last_earn_time: now, remainder: r1 }),
                (KIND, RecordId(5), ClaimState { last_earn_time: now, remainder: r - r1 }),
            ]
        );
    }

    #[test]
    fn settle_transferred_is_empty() {
        let engine = worked_engine();
        let ledger = ledger_with(1_000_000, G + W);
        let plan = ledger
            .settle(&engine, &record(1, 8 * COIN), LifecycleEvent::Transferred, G + W, 520)
            .unwrap();
        assert_eq!(plan, Settlement::default());
    }

    #[test]
    fn carried_remainder_above_one_unit_is_paid() {
        let engine = worked_engine();
        let mut ledger = ledger_with(1, G + W);
        ledger.apply_writes(&[(KIND, RecordId(1), ClaimState { last_earn_time: G + W, remainder: REWARD_PRECISION + 3 })]);
        let e = ledger.earned(&engine, KIND, RecordId(1), G, G + W, 520).unwrap();
        assert_eq!((e.amount, e.remainder), (1, 3));
    }

    #[test]
    fn staged_allocations_accumulate() {
        let mut ledger = ledger_with(10, G + W);
        let staged = ledger
            .stage_allocations(&[(KIND, 5), (RewardKind(2), 7), (KIND, 1)], G + W)
            .unwrap();
        assert_eq!(staged, vec![(KIND, 16), (RewardKind(2), 7)]);
        ledger.commit_allocations(&staged, G + W);
        assert_eq!(ledger.allocation(KIND, G + W), 16);
        assert!(ledger.is_registered(RewardKind(2)));

        let overflow = ledger.stage_allocations(&[(KIND, u128::MAX)], G + W);
        assert_eq!(overflow, Err(ConservationError::ArithmeticOverflow));
    }
}
