//! Lock lifecycle operations.
//!
//! ```text
//!   create ──> ActiveTemporary <──unlock_permanent── ActivePermanent
//!                 │      └──────lock_permanent─────────────^   │
//!                 └─ withdraw / early_withdraw / merge / split ┴─> Terminal
//! ```
//!
//! Every transition that changes a record's amount or end-time, or creates
//! or retires a record, is written to the checkpoint engine at `now`.
//! Transitions that retire a record settle its rewards first.

use serde::{Deserialize, Serialize};
use tracing::info;

use sluice_core::constants::BPS_PRECISION;
use sluice_core::epoch::lock_end;
use sluice_core::error::{AuthorizationError, EscrowError, StateError, ValidationError};
use sluice_core::math::mul_div;
use sluice_core::traits::{ReceiverResolver, Transfer, ValueTransfer};
use sluice_core::types::{AccountId, Asset, LockedBalance, RecordId};

use crate::escrow::Escrow;
use crate::positions::LockRecord;
use crate::rewards::{LifecycleEvent, RewardPayout};

/// Outcome of a withdrawal.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Withdrawal {
    pub record: RecordId,
    /// Locked tokens returned to the owner.
    pub returned: u128,
    /// Locked tokens sent to the penalty sink.
    pub penalty: u128,
    /// Rewards settled on the way out.
    pub rewards: Vec<RewardPayout>,
}

/// Outcome of a merge or split.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Reshape {
    /// Records that exist after the operation, destination first.
    pub records: Vec<RecordId>,
    /// Rewards settled from the retired source.
    pub rewards: Vec<RewardPayout>,
}

/// Early-withdraw penalty:
/// `amount * rate_bps * remaining / (BPS_PRECISION * max_duration)`.
///
/// `remaining` is capped at `max_duration`, so the penalty never exceeds
/// `amount * rate_bps / BPS_PRECISION` even if the configured maximum was
/// lowered after the lock was made.
pub fn early_withdraw_penalty(
    amount: u128,
    rate_bps: u64,
    remaining: u64,
    max_duration: u64,
) -> Result<u128, EscrowError> {
    if max_duration == 0 {
        return Ok(0);
    }
    let numerator = rate_bps as u128 * remaining.min(max_duration) as u128;
    let denominator = BPS_PRECISION as u128 * max_duration as u128;
    Ok(mul_div(amount, numerator, denominator)?)
}

impl<B: ValueTransfer, R: ReceiverResolver> Escrow<B, R> {
    /// Active record that `caller` may act on.
    fn authorized(&self, caller: &AccountId, id: RecordId) -> Result<LockRecord, EscrowError> {
        let record = self.positions.get_active(id)?;
        self.positions.require_owner_or_approved(record, caller)?;
        Ok(record.clone())
    }

    /// Temporary and not yet past its end.
    fn require_live_temporary(record: &LockRecord, now: u64) -> Result<(), StateError> {
        if record.is_permanent {
            return Err(StateError::Permanent(record.id));
        }
        if record.end <= now {
            return Err(StateError::Expired {
                record: record.id,
                end: record.end,
                now,
            });
        }
        Ok(())
    }

    /// Lock `amount` for `duration` seconds, owned by the caller.
    pub fn create_lock(
        &mut self,
        caller: AccountId,
        amount: u128,
        duration: u64,
        now: u64,
    ) -> Result<RecordId, EscrowError> {
        self.create_lock_for(caller, caller, amount, duration, now)
    }

    /// Lock `amount` from `caller` for `duration` seconds, owned by
    /// `beneficiary`.
    ///
    /// The duration is clamped to the configured range and the end-time is
    /// rounded down onto the epoch grid.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::ZeroAmount`]
    /// - [`ValidationError::InvalidDuration`] if the rounded end is not after `now`
    /// - [`ValidationError::SupplyCapExceeded`]
    /// - transfer errors from the deposit
    pub fn create_lock_for(
        &mut self,
        caller: AccountId,
        beneficiary: AccountId,
        amount: u128,
        duration: u64,
        now: u64,
    ) -> Result<RecordId, EscrowError> {
        self.sync(now)?;
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let end = lock_end(now, self.clamp_duration(duration));
        if end <= now {
            return Err(ValidationError::InvalidDuration { duration, end, now }.into());
        }
        self.check_supply_cap(amount)?;

        self.bank.execute(&[Transfer::Deposit {
            asset: Asset::Locked,
            from: caller,
            amount,
        }])?;

        let id = self.positions.allocate_id();
        let record = LockRecord {
            id,
            owner: beneficiary,
            amount,
            end,
            is_permanent: false,
            permanent_origin_end: 0,
            created_at: now,
            terminated_at: None,
        };
        self.commit_records(vec![(LockedBalance::EMPTY, record)], now)?;
        info!(record = %id, owner = %beneficiary, amount, end, "lock created");
        Ok(id)
    }

    /// Add `amount` from any caller to a live temporary record.
    pub fn deposit_for(
        &mut self,
        caller: AccountId,
        id: RecordId,
        amount: u128,
        now: u64,
    ) -> Result<(), EscrowError> {
        self.sync(now)?;
        let record = self.positions.get_active(id)?.clone();
        self.top_up(caller, record, amount, now)
    }

    /// Add `amount` from the caller to a live temporary record it owns or
    /// is approved for.
    pub fn increase_amount(
        &mut self,
        caller: AccountId,
        id: RecordId,
        amount: u128,
        now: u64,
    ) -> Result<(), EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        self.top_up(caller, record, amount, now)
    }

    fn top_up(
        &mut self,
        payer: AccountId,
        record: LockRecord,
        amount: u128,
        now: u64,
    ) -> Result<(), EscrowError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        Self::require_live_temporary(&record, now)?;
        self.check_supply_cap(amount)?;

        self.bank.execute(&[Transfer::Deposit {
            asset: Asset::Locked,
            from: payer,
            amount,
        }])?;

        let old = record.balance();
        let updated = LockRecord {
            amount: record.amount + amount,
            ..record
        };
        let (id, total) = (updated.id, updated.amount);
        self.commit_records(vec![(old, updated)], now)?;
        info!(record = %id, %payer, amount, total, "lock amount increased");
        Ok(())
    }

    /// Move the end-time of a live temporary record to
    /// `lock_end(now, duration)`, which must be later than the current end.
    pub fn increase_unlock_time(
        &mut self,
        caller: AccountId,
        id: RecordId,
        duration: u64,
        now: u64,
    ) -> Result<u64, EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        Self::require_live_temporary(&record, now)?;
        let end = lock_end(now, self.clamp_duration(duration));
        if end <= record.end {
            return Err(ValidationError::EndNotExtended {
                requested: end,
                current: record.end,
            }
            .into());
        }

        let old = record.balance();
        self.commit_records(vec![(old, LockRecord { end, ..record })], now)?;
        info!(record = %id, end, "unlock time increased");
        Ok(end)
    }

    /// Withdraw an expired temporary record. The full amount goes to the
    /// owner; pending rewards are settled to the record's receiver.
    pub fn withdraw(&mut self, caller: AccountId, id: RecordId, now: u64) -> Result<Withdrawal, EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        if record.is_permanent {
            return Err(StateError::Permanent(id).into());
        }
        if record.end > now {
            return Err(StateError::NotExpired {
                record: id,
                end: record.end,
                now,
            }
            .into());
        }
        let withdrawal = self.destroy(record, 0, now)?;
        info!(record = %id, returned = withdrawal.returned, "lock withdrawn");
        Ok(withdrawal)
    }

    /// Withdraw a live temporary record before its end, paying a penalty
    /// proportional to the remaining duration to the penalty sink.
    pub fn early_withdraw(&mut self, caller: AccountId, id: RecordId, now: u64) -> Result<Withdrawal, EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        Self::require_live_temporary(&record, now)?;
        let penalty = early_withdraw_penalty(
            record.amount,
            self.config.penalty_rate_bps,
            record.end - now,
            self.config.max_lock_duration,
        )?;
        let withdrawal = self.destroy(record, penalty, now)?;
        info!(
            record = %id,
            returned = withdrawal.returned,
            penalty,
            "lock withdrawn early"
        );
        Ok(withdrawal)
    }

    fn destroy(&mut self, record: LockRecord, penalty: u128, now: u64) -> Result<Withdrawal, EscrowError> {
        let plan = self.rewards.settle(
            &self.engine,
            &record,
            LifecycleEvent::Destroyed,
            now,
            self.config.max_claim_epochs,
        )?;
        let receiver = self.receiver_of(&record);
        let returned = record.amount.saturating_sub(penalty);

        let mut transfers = Vec::with_capacity(plan.payouts.len() + 2);
        let mut rewards = Vec::with_capacity(plan.payouts.len());
        if returned > 0 {
            transfers.push(Transfer::Payout {
                asset: Asset::Locked,
                to: record.owner,
                amount: returned,
            });
        }
        if penalty > 0 {
            transfers.push(Transfer::Payout {
                asset: Asset::Locked,
                to: self.config.penalty_sink,
                amount: penalty,
            });
        }
        Self::settlement_payouts(&record, receiver, &plan, &mut transfers, &mut rewards);
        self.bank.execute(&transfers)?;

        let old = record.balance();
        let id = record.id;
        self.commit_records(vec![(old, record.terminated(now))], now)?;
        self.rewards.apply_writes(&plan.writes);
        Ok(Withdrawal {
            record: id,
            returned,
            penalty,
            rewards,
        })
    }

    /// Convert a live temporary record to permanent. Its end-time is
    /// remembered for [`unlock_permanent`](Self::unlock_permanent).
    pub fn lock_permanent(&mut self, caller: AccountId, id: RecordId, now: u64) -> Result<(), EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        Self::require_live_temporary(&record, now)?;

        let old = record.balance();
        let updated = LockRecord {
            is_permanent: true,
            permanent_origin_end: record.end,
            end: 0,
            ..record
        };
        self.commit_records(vec![(old, updated)], now)?;
        info!(record = %id, "lock made permanent");
        Ok(())
    }

    /// Convert a permanent record back to temporary with its remembered
    /// end-time. A remembered end in the past leaves the record expired.
    pub fn unlock_permanent(&mut self, caller: AccountId, id: RecordId, now: u64) -> Result<u64, EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        if !record.is_permanent {
            return Err(StateError::NotPermanent(id).into());
        }

        let end = record.permanent_origin_end;
        let old = record.balance();
        let updated = LockRecord {
            is_permanent: false,
            permanent_origin_end: 0,
            end,
            ..record
        };
        self.commit_records(vec![(old, updated)], now)?;
        info!(record = %id, end, "permanent lock released");
        Ok(end)
    }

    /// Merge `from` into `to`. `from` becomes terminal; its amount, pending
    /// rewards, and carried remainders move to `to`. `to` keeps its end-time
    /// and permanence, so both records must share them: the merged weight is
    /// then the sum of the two weights at every later time.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::SelfMerge`]
    /// - [`StateError::MergeTermsMismatch`] unless both records are
    ///   permanent or both end at the same time
    /// - [`StateError::Expired`] for an expired temporary destination
    pub fn merge(
        &mut self,
        caller: AccountId,
        from: RecordId,
        to: RecordId,
        now: u64,
    ) -> Result<Reshape, EscrowError> {
        self.sync(now)?;
        if from == to {
            return Err(ValidationError::SelfMerge(from).into());
        }
        let source = self.authorized(&caller, from)?;
        let dest = self.authorized(&caller, to)?;
        if source.is_permanent != dest.is_permanent || (!dest.is_permanent && source.end != dest.end) {
            return Err(StateError::MergeTermsMismatch { from, to }.into());
        }
        if !dest.is_permanent && dest.end <= now {
            return Err(StateError::Expired {
                record: to,
                end: dest.end,
                now,
            }
            .into());
        }

        let plan = self.rewards.settle(
            &self.engine,
            &source,
            LifecycleEvent::Merged {
                into: to,
                into_created_at: dest.created_at,
            },
            now,
            self.config.max_claim_epochs,
        )?;
        let mut transfers = Vec::new();
        let mut rewards = Vec::new();
        Self::settlement_payouts(&source, self.receiver_of(&source), &plan, &mut transfers, &mut rewards);
        if !transfers.is_empty() {
            self.bank.execute(&transfers)?;
        }

        let merged = LockRecord {
            amount: dest.amount + source.amount,
            ..dest.clone()
        };
        let total = merged.amount;
        self.commit_records(
            vec![
                (source.balance(), source.terminated(now)),
                (dest.balance(), merged),
            ],
            now,
        )?;
        self.rewards.apply_writes(&plan.writes);
        info!(from = %from, to = %to, amount = total, "locks merged");
        Ok(Reshape {
            records: vec![to],
            rewards,
        })
    }

    /// Split `amount` off `from` into a new record. `from` becomes terminal
    /// and two new records hold `from.amount - amount` and `amount`, with
    /// `from`'s end-time and permanence. The self-repay override does not
    /// carry over to either result.
    pub fn split(
        &mut self,
        caller: AccountId,
        from: RecordId,
        amount: u128,
        now: u64,
    ) -> Result<Reshape, EscrowError> {
        self.sync(now)?;
        let source = self.authorized(&caller, from)?;
        if !self.positions.can_split(&source.owner) {
            return Err(AuthorizationError::SplitNotPermitted(source.owner).into());
        }
        if amount == 0 || amount >= source.amount {
            return Err(ValidationError::InvalidSplitAmount {
                amount,
                total: source.amount,
            }
            .into());
        }
        if !source.is_permanent && source.end <= now {
            return Err(StateError::Expired {
                record: from,
                end: source.end,
                now,
            }
            .into());
        }

        let first_id = self.positions.peek_id();
        let second_id = RecordId(first_id.0 + 1);
        let first = LockRecord {
            id: first_id,
            amount: source.amount - amount,
            created_at: now,
            terminated_at: None,
            ..source.clone()
        };
        let second = LockRecord {
            id: second_id,
            amount,
            ..first.clone()
        };

        let plan = self.rewards.settle(
            &self.engine,
            &source,
            LifecycleEvent::Split {
                parts: [(first_id, first.amount), (second_id, second.amount)],
            },
            now,
            self.config.max_claim_epochs,
        )?;
        let mut transfers = Vec::new();
        let mut rewards = Vec::new();
        Self::settlement_payouts(&source, self.receiver_of(&source), &plan, &mut transfers, &mut rewards);
        if !transfers.is_empty() {
            self.bank.execute(&transfers)?;
        }

        self.positions.allocate_id();
        self.positions.allocate_id();
        self.commit_records(
            vec![
                (source.balance(), source.terminated(now)),
                (LockedBalance::EMPTY, first),
                (LockedBalance::EMPTY, second),
            ],
            now,
        )?;
        self.rewards.apply_writes(&plan.writes);
        info!(from = %from, first = %first_id, second = %second_id, amount, "lock split");
        Ok(Reshape {
            records: vec![first_id, second_id],
            rewards,
        })
    }

    /// Approve `approved` (or clear with `None`) to act on record `id`.
    /// Only the owner or one of its operators may do this.
    pub fn approve(
        &mut self,
        caller: AccountId,
        id: RecordId,
        approved: Option<AccountId>,
    ) -> Result<(), EscrowError> {
        let record = self.positions.get_active(id)?;
        if record.owner != caller && !self.positions.is_operator(&record.owner, &caller) {
            return Err(AuthorizationError::NotOwner { record: id, caller }.into());
        }
        self.positions.set_approval(id, approved);
        Ok(())
    }

    /// Let `operator` act on every record the caller owns.
    pub fn set_approval_for_all(&mut self, caller: AccountId, operator: AccountId, approved: bool) {
        self.positions.set_operator(caller, operator, approved);
        info!(owner = %caller, %operator, approved, "operator approval updated");
    }

    /// Move ownership of `id` to `to`. Clears the per-record approval and
    /// any self-repay override set up by the previous owner.
    pub fn transfer(
        &mut self,
        caller: AccountId,
        id: RecordId,
        to: AccountId,
        now: u64,
    ) -> Result<(), EscrowError> {
        self.sync(now)?;
        let record = self.authorized(&caller, id)?;
        let plan = self.rewards.settle(
            &self.engine,
            &record,
            LifecycleEvent::Transferred,
            now,
            self.config.max_claim_epochs,
        )?;

        let from = record.owner;
        self.positions.put(LockRecord { owner: to, ..record })?;
        self.positions.set_approval(id, None);
        self.overrides.clear(id);
        self.rewards.apply_writes(&plan.writes);
        info!(record = %id, %from, %to, "lock transferred");
        Ok(())
    }
}
