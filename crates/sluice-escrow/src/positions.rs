//! Lock record table.
//!
//! Provides [`PositionStore`]: records keyed by monotonic [`RecordId`], the
//! tracked locked supply, per-owner indexes, ERC-721 style approvals, and
//! split permissions. The store only enforces lookup and authorization
//! rules; state transitions are computed by the lifecycle operations and
//! written back through [`PositionStore::put`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use sluice_core::error::{AuthorizationError, ConservationError, StateError};
use sluice_core::types::{AccountId, LockedBalance, RecordId};

/// Lifecycle state of a record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    ActiveTemporary,
    ActivePermanent,
    Terminal,
}

/// A lock record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct LockRecord {
    pub id: RecordId,
    pub owner: AccountId,
    /// Locked base units. Zero once terminal.
    pub amount: u128,
    /// Epoch-aligned unlock time; 0 while permanent.
    pub end: u64,
    pub is_permanent: bool,
    /// End-time remembered by `lock_permanent`, restored by `unlock_permanent`.
    pub permanent_origin_end: u64,
    pub created_at: u64,
    pub terminated_at: Option<u64>,
}

impl LockRecord {
    pub fn state(&self) -> LockState {
        if self.terminated_at.is_some() {
            LockState::Terminal
        } else if self.is_permanent {
            LockState::ActivePermanent
        } else {
            LockState::ActiveTemporary
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminated_at.is_some()
    }

    /// Temporary and past its end-time.
    pub fn is_expired(&self, now: u64) -> bool {
        self.balance().is_expired(now) && !self.is_terminal()
    }

    /// The weight-relevant view handed to the checkpoint engine.
    pub fn balance(&self) -> LockedBalance {
        if self.is_terminal() {
            LockedBalance::EMPTY
        } else if self.is_permanent {
            LockedBalance::permanent(self.amount)
        } else {
            LockedBalance::temporary(self.amount, self.end)
        }
    }

    /// This record made terminal at `now`.
    pub fn terminated(&self, now: u64) -> Self {
        Self {
            amount: 0,
            terminated_at: Some(now),
            ..self.clone()
        }
    }
}

/// Record table plus approvals.
#[derive(Clone, Debug, Default, bincode::Encode, bincode::Decode)]
pub struct PositionStore {
    records: BTreeMap<RecordId, LockRecord>,
    /// Owner → ids of the records it owns (terminal ones included).
    by_owner: HashMap<AccountId, BTreeSet<RecordId>>,
    next_id: u64,
    /// Sum of `amount` over non-terminal records.
    total_locked: u128,
    approvals: HashMap<RecordId, AccountId>,
    operators: HashMap<AccountId, BTreeSet<AccountId>>,
    split_allowed: HashSet<AccountId>,
    split_allowed_for_all: bool,
}

impl PositionStore {
    pub fn new(split_allowed_for_all: bool) -> Self {
        Self {
            next_id: 1,
            split_allowed_for_all,
            ..Self::default()
        }
    }

    /// Next id that [`allocate_id`](Self::allocate_id) would hand out.
    pub fn peek_id(&self) -> RecordId {
        RecordId(self.next_id)
    }

    /// Reserve the next record id. Ids are never reused.
    pub fn allocate_id(&mut self) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: RecordId) -> Result<&LockRecord, StateError> {
        self.records.get(&id).ok_or(StateError::RecordNotFound(id))
    }

    /// A record that exists and is not terminal.
    pub fn get_active(&self, id: RecordId) -> Result<&LockRecord, StateError> {
        let record = self.get(id)?;
        if record.is_terminal() {
            return Err(StateError::RecordTerminal(id));
        }
        Ok(record)
    }

    pub fn total_locked(&self) -> u128 {
        self.total_locked
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockRecord> {
        self.records.values()
    }

    /// Ids of every record `owner` holds, ascending.
    pub fn records_of(&self, owner: &AccountId) -> Vec<RecordId> {
        self.by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Insert or replace a record, keeping the locked supply and owner index
    /// in step.
    ///
    /// # Errors
    ///
    /// [`ConservationError::ArithmeticOverflow`] if the supply would leave
    /// the `u128` range; nothing is written in that case.
    pub fn put(&mut self, record: LockRecord) -> Result<(), ConservationError> {
        let live = |r: &LockRecord| if r.is_terminal() { 0 } else { r.amount };
        let previous = self.records.get(&record.id);
        let old_amount = previous.map(live).unwrap_or(0);
        let total = self
            .total_locked
            .checked_sub(old_amount)
            .and_then(|t| t.checked_add(live(&record)))
            .ok_or(ConservationError::ArithmeticOverflow)?;

        if let Some(old_owner) = previous.map(|r| r.owner).filter(|o| *o != record.owner) {
            if let Some(ids) = self.by_owner.get_mut(&old_owner) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.by_owner.remove(&old_owner);
                }
            }
        }
        self.by_owner.entry(record.owner).or_default().insert(record.id);
        self.total_locked = total;
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Recompute the locked supply from the table and compare.
    pub fn verify_supply(&self) -> Result<(), ConservationError> {
        let summed = self
            .records
            .values()
            .filter(|r| !r.is_terminal())
            .try_fold(0u128, |acc, r| acc.checked_add(r.amount))
            .ok_or(ConservationError::ArithmeticOverflow)?;
        if summed != self.total_locked {
            return Err(ConservationError::SupplyMismatch {
                tracked: self.total_locked,
                summed,
            });
        }
        Ok(())
    }

    // --- approvals ---

    pub fn approved(&self, id: RecordId) -> Option<AccountId> {
        self.approvals.get(&id).copied()
    }

    pub fn is_operator(&self, owner: &AccountId, operator: &AccountId) -> bool {
        self.operators
            .get(owner)
            .is_some_and(|ops| ops.contains(operator))
    }

    pub fn is_owner_or_approved(&self, record: &LockRecord, caller: &AccountId) -> bool {
        record.owner == *caller
            || self.approved(record.id) == Some(*caller)
            || self.is_operator(&record.owner, caller)
    }

    pub fn require_owner_or_approved(
        &self,
        record: &LockRecord,
        caller: &AccountId,
    ) -> Result<(), AuthorizationError> {
        if self.is_owner_or_approved(record, caller) {
            Ok(())
        } else {
            Err(AuthorizationError::NotOwnerOrApproved {
                record: record.id,
                caller: *caller,
            })
        }
    }

    /// Set or clear (`None`) the single approved account for `id`.
    pub fn set_approval(&mut self, id: RecordId, approved: Option<AccountId>) {
        match approved {
            Some(account) => self.approvals.insert(id, account),
            None => self.approvals.remove(&id),
        };
    }

    pub fn set_operator(&mut self, owner: AccountId, operator: AccountId, approved: bool) {
        if approved {
            self.operators.entry(owner).or_default().insert(operator);
        } else if let Some(ops) = self.operators.get_mut(&owner) {
            ops.remove(&operator);
            if ops.is_empty() {
                self.operators.remove(&owner);
            }
        }
    }

    // --- split permission ---

    pub fn can_split(&self, owner: &AccountId) -> bool {
        self.split_allowed_for_all || self.split_allowed.contains(owner)
    }

    /// Grant or revoke split permission for one account, or for everyone
    /// when `account` is `None`.
    pub fn set_split_permission(&mut self, account: Option<AccountId>, allowed: bool) {
        match (account, allowed) {
            (None, allowed) => self.split_allowed_for_all = allowed,
            (Some(a), true) => {
                self.split_allowed.insert(a);
            }
            (Some(a), false) => {
                self.split_allowed.remove(&a);
            }
        }
    }
}
