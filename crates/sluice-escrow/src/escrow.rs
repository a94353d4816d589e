//! The [`Escrow`] facade.
//!
//! Owns the record table, the checkpoint engine, the reward ledger, and the
//! self-repay registry, plus the two external collaborators. Every public
//! operation takes the caller's clock reading `now`; operations are
//! implemented across `lifecycle`, `claims`, and `views`.
//!
//! Each mutating operation follows the same order:
//! 1. bring the global checkpoint to `now` ([`Escrow::checkpoint`] progress
//!    is kept even if a later step fails)
//! 2. validate and compute the complete effect without writing
//! 3. execute all value movement in one [`ValueTransfer::execute`] call
//! 4. commit checkpoint changes, records, and claim states

use std::collections::BTreeSet;

use tracing::info;

use sluice_core::config::EscrowConfig;
use sluice_core::constants::{BPS_PRECISION, MAX_LOCKED_SUPPLY};
use sluice_core::error::{AuthorizationError, EscrowError, ValidationError};
use sluice_core::traits::{ReceiverResolver, Transfer, ValueTransfer};
use sluice_core::types::{AccountId, Asset, LockedBalance};
use sluice_decay::{CheckpointEngine, CheckpointProgress};

use crate::positions::{LockRecord, PositionStore};
use crate::rewards::{RewardLedger, RewardPayout, Settlement};
use crate::self_repay::SelfRepayRegistry;

/// Time-locked escrow with decaying weight and epoch reward distribution.
///
/// Not thread-safe; see [`EscrowHandle`](crate::handle::EscrowHandle) for
/// shared access.
pub struct Escrow<B, R> {
    pub(crate) config: EscrowConfig,
    pub(crate) positions: PositionStore,
    pub(crate) engine: CheckpointEngine,
    pub(crate) rewards: RewardLedger,
    pub(crate) overrides: SelfRepayRegistry,
    pub(crate) bank: B,
    pub(crate) resolver: R,
}

impl<B: ValueTransfer, R: ReceiverResolver> Escrow<B, R> {
    /// Create an empty escrow whose checkpoint history starts at `genesis`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidConfig`] if `config` is inconsistent.
    pub fn new(config: EscrowConfig, genesis: u64, bank: B, resolver: R) -> Result<Self, EscrowError> {
        config.validate()?;
        info!(
            genesis,
            max_lock = config.max_lock_duration,
            penalty_bps = config.penalty_rate_bps,
            "escrow initialized"
        );
        Ok(Self {
            positions: PositionStore::new(config.split_allowed_for_all),
            engine: CheckpointEngine::new(genesis, config.max_replay_steps),
            rewards: RewardLedger::new(),
            overrides: SelfRepayRegistry::new(),
            config,
            bank,
            resolver,
        })
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    pub fn engine(&self) -> &CheckpointEngine {
        &self.engine
    }

    /// Advance the global checkpoint toward `now` (bounded; call again while
    /// `caught_up` is false).
    pub fn checkpoint(&mut self, now: u64) -> Result<CheckpointProgress, EscrowError> {
        self.engine.checkpoint(now)
    }

    /// Checkpoint to `now` and fail if that takes more than one bounded pass.
    pub(crate) fn sync(&mut self, now: u64) -> Result<(), EscrowError> {
        self.engine.checkpoint(now)?;
        self.engine.ensure_caught_up(now)?;
        Ok(())
    }

    // --- admin ---

    pub fn set_penalty_rate_bps(&mut self, bps: u64) -> Result<(), EscrowError> {
        if bps > BPS_PRECISION {
            return Err(ValidationError::InvalidConfig(format!(
                "penalty_rate_bps {bps} > {BPS_PRECISION}"
            ))
            .into());
        }
        self.config.penalty_rate_bps = bps;
        info!(bps, "penalty rate updated");
        Ok(())
    }

    pub fn set_penalty_sink(&mut self, sink: AccountId) {
        self.config.penalty_sink = sink;
        info!(%sink, "penalty sink updated");
    }

    pub fn set_max_batch_size(&mut self, max: usize) -> Result<(), EscrowError> {
        if max == 0 {
            return Err(ValidationError::InvalidConfig("max_batch_size must be non-zero".into()).into());
        }
        self.config.max_batch_size = max;
        Ok(())
    }

    pub fn set_max_claim_epochs(&mut self, max: u64) -> Result<(), EscrowError> {
        if max == 0 {
            return Err(ValidationError::InvalidConfig("max_claim_epochs must be non-zero".into()).into());
        }
        self.config.max_claim_epochs = max;
        Ok(())
    }

    pub fn set_max_replay_steps(&mut self, max: u64) -> Result<(), EscrowError> {
        if max == 0 {
            return Err(ValidationError::InvalidConfig("max_replay_steps must be non-zero".into()).into());
        }
        self.config.max_replay_steps = max;
        self.engine.set_max_replay_steps(max);
        Ok(())
    }

    /// Allow or forbid splitting for one account, or for everyone when
    /// `account` is `None`.
    pub fn toggle_split_permission(&mut self, account: Option<AccountId>, allowed: bool) {
        self.positions.set_split_permission(account, allowed);
        if account.is_none() {
            self.config.split_allowed_for_all = allowed;
        }
        match account {
            Some(account) => info!(%account, allowed, "split permission updated"),
            None => info!(allowed, "split permission updated for everyone"),
        }
    }

    pub fn authorize_distributor(&mut self, distributor: AccountId) {
        if !self.config.distributors.contains(&distributor) {
            self.config.distributors.push(distributor);
            info!(%distributor, "distributor authorized");
        }
    }

    pub fn revoke_distributor(&mut self, distributor: &AccountId) {
        self.config.distributors.retain(|d| d != distributor);
    }

    pub fn is_distributor(&self, account: &AccountId) -> bool {
        self.config.distributors.contains(account)
    }

    pub(crate) fn require_distributor(&self, account: &AccountId) -> Result<(), AuthorizationError> {
        if self.is_distributor(account) {
            Ok(())
        } else {
            Err(AuthorizationError::NotDistributor(*account))
        }
    }

    // --- shared helpers ---

    /// Where rewards of `record` are paid: its override receiver or owner.
    pub(crate) fn receiver_of(&self, record: &LockRecord) -> AccountId {
        self.overrides.receiver(record.id).unwrap_or(record.owner)
    }

    /// Reject empty batches and batches longer than the configured maximum.
    /// The raw length counts, duplicates included.
    pub(crate) fn check_batch_len(&self, len: usize) -> Result<(), ValidationError> {
        if len == 0 {
            return Err(ValidationError::EmptyBatch);
        }
        if len > self.config.max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                size: len,
                max: self.config.max_batch_size,
            });
        }
        Ok(())
    }

    /// Locked supply after adding `amount`, or `SupplyCapExceeded`.
    pub(crate) fn check_supply_cap(&self, amount: u128) -> Result<u128, ValidationError> {
        let requested = self.positions.total_locked().saturating_add(amount);
        if requested > MAX_LOCKED_SUPPLY {
            return Err(ValidationError::SupplyCapExceeded {
                requested,
                max: MAX_LOCKED_SUPPLY,
            });
        }
        Ok(requested)
    }

    /// Clamp a requested lock duration into the configured range.
    pub(crate) fn clamp_duration(&self, duration: u64) -> u64 {
        duration.clamp(self.config.min_lock_duration, self.config.max_lock_duration)
    }

    /// Payout transfers for a settlement, all to `receiver`.
    pub(crate) fn settlement_payouts(
        record: &LockRecord,
        receiver: AccountId,
        plan: &Settlement,
        transfers: &mut Vec<Transfer>,
        receipts: &mut Vec<RewardPayout>,
    ) {
        for &(kind, amount) in &plan.payouts {
            transfers.push(Transfer::Payout {
                asset: Asset::Reward(kind),
                to: receiver,
                amount,
            });
            receipts.push(RewardPayout {
                record: record.id,
                kind,
                receiver,
                amount,
            });
        }
    }

    /// Apply checkpoint changes and write records. Each entry is the
    /// record's balance before the operation and its new state.
    ///
    /// Runs after value has moved; the supply cap checked beforehand keeps
    /// every contribution within range.
    pub(crate) fn commit_records(
        &mut self,
        changes: Vec<(LockedBalance, LockRecord)>,
        now: u64,
    ) -> Result<(), EscrowError> {
        for (old, record) in changes {
            self.engine.record_change(record.id, &old, &record.balance(), now)?;
            if record.is_terminal() {
                self.positions.set_approval(record.id, None);
                self.overrides.clear(record.id);
            }
            self.positions.put(record)?;
        }
        Ok(())
    }
}

/// Distinct items in first-seen order.
pub(crate) fn dedup<T: Ord + Copy>(items: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.iter().copied().filter(|i| seen.insert(*i)).collect()
}
