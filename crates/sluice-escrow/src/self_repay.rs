//! Self-repay overrides: records whose rewards are redirected to a
//! receiver resolved for their owner.

use std::collections::{BTreeSet, HashMap};

use sluice_core::types::{AccountId, RecordId};

/// Override table plus the reverse per-owner index.
#[derive(Clone, Debug, Default, bincode::Encode, bincode::Decode)]
pub struct SelfRepayRegistry {
    receivers: HashMap<RecordId, AccountId>,
    /// Owner at enable time → records it enabled.
    by_owner: HashMap<AccountId, BTreeSet<RecordId>>,
    /// Record → owner at enable time, to keep `by_owner` consistent.
    enabled_by: HashMap<RecordId, AccountId>,
}

impl SelfRepayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receiver(&self, id: RecordId) -> Option<AccountId> {
        self.receivers.get(&id).copied()
    }

    pub fn is_enabled(&self, id: RecordId) -> bool {
        self.receivers.contains_key(&id)
    }

    /// Records with an override that `owner` enabled, ascending.
    pub fn records_of(&self, owner: &AccountId) -> Vec<RecordId> {
        self.by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn enable(&mut self, id: RecordId, owner: AccountId, receiver: AccountId) {
        self.clear(id);
        self.receivers.insert(id, receiver);
        self.enabled_by.insert(id, owner);
        self.by_owner.entry(owner).or_default().insert(id);
    }

    /// Remove any override on `id`. Returns the receiver it had.
    pub fn clear(&mut self, id: RecordId) -> Option<AccountId> {
        let receiver = self.receivers.remove(&id)?;
        if let Some(owner) = self.enabled_by.remove(&id) {
            if let Some(ids) = self.by_owner.get_mut(&owner) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_owner.remove(&owner);
                }
            }
        }
        Some(receiver)
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}
