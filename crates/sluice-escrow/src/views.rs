//! Read-only queries.
//!
//! Weight reads never advance the global checkpoint. A total-weight read far
//! past the last checkpoint may fail with `ReplayBoundExceeded`; call
//! [`Escrow::checkpoint`] first in that case.

use sluice_core::error::{EscrowError, TemporalError};
use sluice_core::traits::{ReceiverResolver, ValueTransfer};
use sluice_core::types::{AccountId, RecordId, RewardKind};
use sluice_decay::{GlobalPoint, UserPoint};

use crate::escrow::Escrow;
use crate::positions::LockRecord;
use crate::rewards::ClaimState;

impl<B: ValueTransfer, R: ReceiverResolver> Escrow<B, R> {
    pub fn record(&self, id: RecordId) -> Result<&LockRecord, EscrowError> {
        Ok(self.positions.get(id)?)
    }

    /// Sum of amounts over non-terminal records.
    pub fn total_locked(&self) -> u128 {
        self.positions.total_locked()
    }

    pub fn records_of(&self, owner: &AccountId) -> Vec<RecordId> {
        self.positions.records_of(owner)
    }

    pub fn records(&self) -> impl Iterator<Item = &LockRecord> {
        self.positions.iter()
    }

    pub fn approved(&self, id: RecordId) -> Option<AccountId> {
        self.positions.approved(id)
    }

    pub fn is_approved_for_all(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.positions.is_operator(owner, operator)
    }

    pub fn can_split(&self, owner: &AccountId) -> bool {
        self.positions.can_split(owner)
    }

    // --- weights ---

    /// Weight of `id` at `now`.
    pub fn weight_of(&self, id: RecordId, now: u64) -> u128 {
        self.engine.weight_at(id, now)
    }

    /// Weight of `id` at any past or future time `t`.
    pub fn weight_of_at(&self, id: RecordId, t: u64) -> u128 {
        self.engine.weight_at(id, t)
    }

    pub fn total_weight(&self, now: u64) -> Result<u128, EscrowError> {
        self.engine.total_weight_at(now)
    }

    pub fn total_weight_at(&self, t: u64) -> Result<u128, EscrowError> {
        self.engine.total_weight_at(t)
    }

    pub fn user_points(&self, id: RecordId) -> &[UserPoint] {
        self.engine.user_history(id)
    }

    pub fn global_points(&self) -> &[GlobalPoint] {
        self.engine.global_history()
    }

    // --- rewards ---

    pub fn reward_kinds(&self) -> Vec<RewardKind> {
        self.rewards.kinds().collect()
    }

    /// Amount of `kind` activating at epoch boundary `epoch`.
    pub fn allocation(&self, kind: RewardKind, epoch: u64) -> u128 {
        self.rewards.allocation(kind, epoch)
    }

    /// Claim cursor of `(kind, id)`; defaults to the record's creation time.
    pub fn claim_state(&self, kind: RewardKind, id: RecordId) -> Result<ClaimState, EscrowError> {
        let record = self.positions.get(id)?;
        Ok(self.rewards.claim_state(kind, id, record.created_at))
    }

    pub fn self_repay_receiver(&self, id: RecordId) -> Option<AccountId> {
        self.overrides.receiver(id)
    }

    /// Records for which `owner` enabled self-repay.
    pub fn self_repay_records_of(&self, owner: &AccountId) -> Vec<RecordId> {
        self.overrides.records_of(owner)
    }

    /// Whole units of `kind` claimable by `id` at `now`.
    pub fn earned(&self, kind: RewardKind, id: RecordId, now: u64) -> Result<u128, EscrowError> {
        self.earned_until_ts(kind, id, now, now)
    }

    pub fn earned_until_ts(
        &self,
        kind: RewardKind,
        id: RecordId,
        ts: u64,
        now: u64,
    ) -> Result<u128, EscrowError> {
        if ts > now {
            return Err(TemporalError::FutureTimestamp { ts, now }.into());
        }
        let record = self.positions.get(id)?;
        let earned = self.rewards.earned(
            &self.engine,
            kind,
            id,
            record.created_at,
            ts,
            self.config.max_claim_epochs,
        )?;
        Ok(earned.amount)
    }

    /// Claimable amount for every registered kind.
    pub fn earned_all(&self, id: RecordId, now: u64) -> Result<Vec<(RewardKind, u128)>, EscrowError> {
        self.earned_all_until_ts(id, now, now)
    }

    pub fn earned_all_until_ts(
        &self,
        id: RecordId,
        ts: u64,
        now: u64,
    ) -> Result<Vec<(RewardKind, u128)>, EscrowError> {
        self.rewards
            .kinds()
            .map(|kind| Ok((kind, self.earned_until_ts(kind, id, ts, now)?)))
            .collect()
    }
}
