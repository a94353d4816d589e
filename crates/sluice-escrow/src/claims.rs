//! Reward notification, claiming, and self-repay toggles.

use std::collections::BTreeMap;

use tracing::{debug, info};

use sluice_core::epoch::next_epoch_boundary;
use sluice_core::error::{EscrowError, StateError, TemporalError, ValidationError};
use sluice_core::traits::{ReceiverResolver, Transfer, ValueTransfer};
use sluice_core::types::{AccountId, Asset, RecordId, RewardKind};

use crate::escrow::{dedup, Escrow};
use crate::rewards::{ClaimState, RewardPayout};

impl<B: ValueTransfer, R: ReceiverResolver> Escrow<B, R> {
    /// Deposit `amount` of `kind` from a distributor, to be shared at the
    /// next epoch boundary after `now`. Registers `kind` on first use.
    ///
    /// Returns the boundary the allocation activates at.
    pub fn notify(
        &mut self,
        caller: AccountId,
        kind: RewardKind,
        amount: u128,
        now: u64,
    ) -> Result<u64, EscrowError> {
        self.notify_batch(caller, &[kind], &[amount], now)
    }

    /// [`notify`](Self::notify) for several kinds in one atomic call.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::LengthMismatch`] if `kinds` and `amounts` differ in length
    /// - [`ValidationError::EmptyBatch`] / [`ValidationError::BatchTooLarge`]
    /// - [`ValidationError::ZeroAmount`] for any zero amount
    /// - [`AuthorizationError::NotDistributor`](sluice_core::error::AuthorizationError::NotDistributor)
    pub fn notify_batch(
        &mut self,
        caller: AccountId,
        kinds: &[RewardKind],
        amounts: &[u128],
        now: u64,
    ) -> Result<u64, EscrowError> {
        self.sync(now)?;
        if kinds.len() != amounts.len() {
            return Err(ValidationError::LengthMismatch {
                left: kinds.len(),
                right: amounts.len(),
            }
            .into());
        }
        self.check_batch_len(kinds.len())?;
        self.require_distributor(&caller)?;
        if amounts.contains(&0) {
            return Err(ValidationError::ZeroAmount.into());
        }

        let epoch = next_epoch_boundary(now);
        let items: Vec<(RewardKind, u128)> = kinds.iter().copied().zip(amounts.iter().copied()).collect();
        let staged = self.rewards.stage_allocations(&items, epoch)?;
        let transfers: Vec<Transfer> = items
            .iter()
            .map(|&(kind, amount)| Transfer::Deposit {
                asset: Asset::Reward(kind),
                from: caller,
                amount,
            })
            .collect();
        self.bank.execute(&transfers)?;

        self.rewards.commit_allocations(&staged, epoch);
        for &(kind, amount) in &items {
            info!(%kind, amount, epoch, distributor = %caller, "rewards notified");
        }
        Ok(epoch)
    }

    /// Claim rewards of `kinds` for record `id` up to `now`.
    pub fn get_reward(
        &mut self,
        caller: AccountId,
        id: RecordId,
        kinds: &[RewardKind],
        now: u64,
    ) -> Result<Vec<RewardPayout>, EscrowError> {
        self.claim(caller, &[id], kinds, now, now)
    }

    /// Claim rewards of `kinds` for record `id` up to `ts <= now`. Use this
    /// to work through a long unclaimed history in bounded steps.
    pub fn get_reward_until_ts(
        &mut self,
        caller: AccountId,
        id: RecordId,
        kinds: &[RewardKind],
        ts: u64,
        now: u64,
    ) -> Result<Vec<RewardPayout>, EscrowError> {
        self.claim(caller, &[id], kinds, ts, now)
    }

    /// Claim for several records at once. Duplicate ids and kinds are
    /// ignored; the batch is all-or-nothing.
    pub fn get_reward_batch(
        &mut self,
        caller: AccountId,
        ids: &[RecordId],
        kinds: &[RewardKind],
        now: u64,
    ) -> Result<Vec<RewardPayout>, EscrowError> {
        self.claim(caller, ids, kinds, now, now)
    }

    pub fn get_reward_until_ts_batch(
        &mut self,
        caller: AccountId,
        ids: &[RecordId],
        kinds: &[RewardKind],
        ts: u64,
        now: u64,
    ) -> Result<Vec<RewardPayout>, EscrowError> {
        self.claim(caller, ids, kinds, ts, now)
    }

    fn claim(
        &mut self,
        caller: AccountId,
        ids: &[RecordId],
        kinds: &[RewardKind],
        upto: u64,
        now: u64,
    ) -> Result<Vec<RewardPayout>, EscrowError> {
        self.sync(now)?;
        if upto > now {
            return Err(TemporalError::FutureTimestamp { ts: upto, now }.into());
        }
        self.check_batch_len(ids.len())?;
        self.check_batch_len(kinds.len())?;
        let ids = dedup(ids);
        let kinds = dedup(kinds);
        for &kind in &kinds {
            self.rewards.require_registered(kind)?;
        }

        let mut payouts = Vec::new();
        let mut writes = Vec::with_capacity(ids.len() * kinds.len());
        for &id in &ids {
            let record = self.positions.get(id)?;
            self.positions.require_owner_or_approved(record, &caller)?;
            let receiver = self.receiver_of(record);
            for &kind in &kinds {
                let earned = self.rewards.earned(
                    &self.engine,
                    kind,
                    id,
                    record.created_at,
                    upto,
                    self.config.max_claim_epochs,
                )?;
                writes.push((
                    kind,
                    id,
                    ClaimState {
                        last_earn_time: earned.cursor,
                        remainder: earned.remainder,
                    },
                ));
                if earned.amount > 0 {
                    payouts.push(RewardPayout {
                        record: id,
                        kind,
                        receiver,
                        amount: earned.amount,
                    });
                }
            }
        }

        // One transfer per (kind, receiver).
        let mut totals: BTreeMap<(RewardKind, AccountId), u128> = BTreeMap::new();
        for p in &payouts {
            *totals.entry((p.kind, p.receiver)).or_default() += p.amount;
        }
        let transfers: Vec<Transfer> = totals
            .into_iter()
            .map(|((kind, to), amount)| Transfer::Payout {
                asset: Asset::Reward(kind),
                to,
                amount,
            })
            .collect();
        if !transfers.is_empty() {
            self.bank.execute(&transfers)?;
        }

        self.rewards.apply_writes(&writes);
        for p in &payouts {
            debug!(record = %p.record, kind = %p.kind, receiver = %p.receiver, amount = p.amount, "reward claimed");
        }
        Ok(payouts)
    }

    /// Redirect future reward claims of `id` to the receiver resolved for
    /// its owner.
    pub fn enable_self_repay_loan(&mut self, caller: AccountId, id: RecordId, now: u64) -> Result<AccountId, EscrowError> {
        self.enable_self_repay_loan_batch(caller, &[id], now)?
            .into_iter()
            .next()
            .map(|(_, receiver)| receiver)
            .ok_or_else(|| StateError::RecordNotFound(id).into())
    }

    pub fn disable_self_repay_loan(&mut self, caller: AccountId, id: RecordId, now: u64) -> Result<(), EscrowError> {
        self.disable_self_repay_loan_batch(caller, &[id], now)
    }

    /// Enable overrides for every id, or for none if any fails.
    pub fn enable_self_repay_loan_batch(
        &mut self,
        caller: AccountId,
        ids: &[RecordId],
        now: u64,
    ) -> Result<Vec<(RecordId, AccountId)>, EscrowError> {
        self.sync(now)?;
        self.check_batch_len(ids.len())?;
        let ids = dedup(ids);

        let mut owners = Vec::with_capacity(ids.len());
        for &id in &ids {
            let record = self.positions.get_active(id)?;
            self.positions.require_owner_or_approved(record, &caller)?;
            if self.overrides.is_enabled(id) {
                return Err(StateError::OverrideAlreadyEnabled(id).into());
            }
            owners.push((id, record.owner));
        }

        let mut enabled = Vec::with_capacity(owners.len());
        for (id, owner) in owners {
            let receiver = self.resolver.resolve(&owner)?;
            enabled.push((id, owner, receiver));
        }
        for &(id, owner, receiver) in &enabled {
            self.overrides.enable(id, owner, receiver);
            info!(record = %id, %owner, %receiver, "self-repay enabled");
        }
        Ok(enabled.into_iter().map(|(id, _, r)| (id, r)).collect())
    }

    /// Clear overrides for every id, or for none if any fails.
    pub fn disable_self_repay_loan_batch(
        &mut self,
        caller: AccountId,
        ids: &[RecordId],
        now: u64,
    ) -> Result<(), EscrowError> {
        self.sync(now)?;
        self.check_batch_len(ids.len())?;
        let ids = dedup(ids);

        for &id in &ids {
            let record = self.positions.get_active(id)?;
            self.positions.require_owner_or_approved(record, &caller)?;
            if !self.overrides.is_enabled(id) {
                return Err(StateError::OverrideNotEnabled(id).into());
            }
        }
        for id in ids {
            self.overrides.clear(id);
            info!(record = %id, "self-repay disabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::bank::{MemoryBank, MemoryResolver};
    use sluice_core::config::EscrowConfig;
    use sluice_core::constants::{COIN, EPOCH_DURATION};
    use sluice_core::error::{AuthorizationError, ResolverError};

    const W: u64 = EPOCH_DURATION;
    const G: u64 = 100 * W;
    const KIND: RewardKind = RewardKind(1);

    type TestEscrow = Escrow<MemoryBank, MemoryResolver>;

    fn acct(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    fn distributor() -> AccountId {
        acct(0xD0)
    }

    /// Escrow with two permanent records (8 and 6 tokens) for acct(1)/acct(2)
    /// and a funded distributor.
    fn setup() -> (TestEscrow, RecordId, RecordId) {
        let cfg = EscrowConfig {
            distributors: vec![distributor()],
            ..EscrowConfig::default()
        };
        let mut e = Escrow::new(cfg, G, MemoryBank::new(), MemoryResolver::new()).unwrap();
        e.bank_mut().credit(Asset::Locked, acct(1), 8 * COIN);
        e.bank_mut().credit(Asset::Locked, acct(2), 6 * COIN);
        e.bank_mut().credit(Asset::Reward(KIND), distributor(), 1_000 * COIN);
        e.bank_mut().credit(Asset::Reward(RewardKind(2)), distributor(), 1_000 * COIN);
        let a = e.create_lock(acct(1), 8 * COIN, W, G).unwrap();
        let b = e.create_lock(acct(2), 6 * COIN, W, G).unwrap();
        e.lock_permanent(acct(1), a, G).unwrap();
        e.lock_permanent(acct(2), b, G).unwrap();
        (e, a, b)
    }

    #[test]
    fn notify_targets_next_boundary() {
        let (mut e, _, _) = setup();
        let epoch = e.notify(distributor(), KIND, 700, G + 5).unwrap();
        assert_eq!(epoch, G + W);
        assert_eq!(e.rewards.allocation(KIND, G + W), 700);
        assert_eq!(e.bank().custody(Asset::Reward(KIND)), 700);

        // Notifying exactly on a boundary targets the following one.
        assert_eq!(e.notify(distributor(), KIND, 1, G + W).unwrap(), G + 2 * W);
    }

    #[test]
    fn notify_requires_distributor() {
        let (mut e, _, _) = setup();
        assert_eq!(
            e.notify(acct(1), KIND, 1, G).unwrap_err(),
            EscrowError::Authorization(AuthorizationError::NotDistributor(acct(1)))
        );
        assert!(!e.rewards.is_registered(KIND));
    }

    #[test]
    fn notify_batch_validates_lengths() {
        let (mut e, _, _) = setup();
        assert_eq!(
            e.notify_batch(distributor(), &[KIND], &[1, 2], G).unwrap_err(),
            EscrowError::Validation(ValidationError::LengthMismatch { left: 1, right: 2 })
        );
        assert_eq!(
            e.notify_batch(distributor(), &[KIND, RewardKind(2)], &[1, 0], G).unwrap_err(),
            EscrowError::Validation(ValidationError::ZeroAmount)
        );
        e.notify_batch(distributor(), &[KIND, RewardKind(2)], &[10, 20], G).unwrap();
        assert_eq!(e.rewards.allocation(RewardKind(2), G + W), 20);
    }

    #[test]
    fn claim_pays_proportional_share() {
        let (mut e, a, b) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        let pa = e.get_reward(acct(1), a, &[KIND], G + W).unwrap();
        let pb = e.get_reward(acct(2), b, &[KIND], G + W).unwrap();
        assert_eq!(pa[0].amount, 800);
        assert_eq!(pb[0].amount, 600);
        assert_eq!(e.bank().balance(Asset::Reward(KIND), &acct(1)), 800);
        assert_eq!(e.bank().custody(Asset::Reward(KIND)), 0);
    }

    #[test]
    fn claim_is_idempotent() {
        let (mut e, a, _) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        e.get_reward(acct(1), a, &[KIND], G + W).unwrap();
        assert!(e.get_reward(acct(1), a, &[KIND], G + W).unwrap().is_empty());
        assert!(e.get_reward(acct(1), a, &[KIND], G + W + 100).unwrap().is_empty());
        assert_eq!(e.bank().balance(Asset::Reward(KIND), &acct(1)), 800);
    }

    #[test]
    fn claim_rejects_future_ts_and_unknown_kind() {
        let (mut e, a, _) = setup();
        assert_eq!(
            e.get_reward_until_ts(acct(1), a, &[KIND], G + 10, G + 5).unwrap_err(),
            EscrowError::Temporal(TemporalError::FutureTimestamp { ts: G + 10, now: G + 5 })
        );
        assert_eq!(
            e.get_reward(acct(1), a, &[KIND], G + 5).unwrap_err(),
            EscrowError::Validation(ValidationError::UnknownRewardKind(KIND))
        );
    }

    #[test]
    fn claim_requires_owner_or_approved() {
        let (mut e, a, _) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        assert!(matches!(
            e.get_reward(acct(2), a, &[KIND], G + W).unwrap_err(),
            EscrowError::Authorization(AuthorizationError::NotOwnerOrApproved { .. })
        ));
    }

    #[test]
    fn batch_deduplicates() {
        let (mut e, a, _) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        let payouts = e
            .get_reward_batch(acct(1), &[a, a, a], &[KIND, KIND], G + W)
            .unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(e.bank().balance(Asset::Reward(KIND), &acct(1)), 800);
    }

    #[test]
    fn batch_size_counts_raw_input() {
        let (mut e, a, _) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        e.set_max_batch_size(2).unwrap();
        assert_eq!(
            e.get_reward_batch(acct(1), &[a, a, a], &[KIND], G + W).unwrap_err(),
            EscrowError::Validation(ValidationError::BatchTooLarge { size: 3, max: 2 })
        );
        assert_eq!(
            e.get_reward_batch(acct(1), &[], &[KIND], G + W).unwrap_err(),
            EscrowError::Validation(ValidationError::EmptyBatch)
        );
    }

    #[test]
    fn batch_is_atomic() {
        let (mut e, a, b) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        // acct(1) may not claim b, so a's claim must not happen either.
        assert!(e.get_reward_batch(acct(1), &[a, b], &[KIND], G + W).is_err());
        assert_eq!(e.bank().balance(Asset::Reward(KIND), &acct(1)), 0);
        assert_eq!(e.rewards.stored_claim(KIND, a), None);
    }

    #[test]
    fn self_repay_redirects_claims() {
        let (mut e, a, _) = setup();
        e.notify(distributor(), KIND, 1_400, G).unwrap();
        let receiver = e.enable_self_repay_loan(acct(1), a, G + 1).unwrap();
        assert_eq!(receiver, MemoryResolver::derive(&acct(1)));
        assert_eq!(
            e.enable_self_repay_loan(acct(1), a, G + 1).unwrap_err(),
            EscrowError::State(StateError::OverrideAlreadyEnabled(a))
        );

        let payouts = e.get_reward(acct(1), a, &[KIND], G + W).unwrap();
        assert_eq!(payouts[0].receiver, receiver);
        assert_eq!(e.bank().balance(Asset::Reward(KIND), &receiver), 800);
        assert_eq!(e.bank().balance(Asset::Reward(KIND), &acct(1)), 0);

        e.disable_self_repay_loan(acct(1), a, G + W).unwrap();
        assert_eq!(
            e.disable_self_repay_loan(acct(1), a, G + W).unwrap_err(),
            EscrowError::State(StateError::OverrideNotEnabled(a))
        );
    }

    #[test]
    fn self_repay_batch_is_atomic_on_resolver_failure() {
        let (mut e, a, b) = setup();
        e.set_approval_for_all(acct(2), acct(1), true);
        e.resolver_mut().mark_unavailable(acct(2));
        let err = e.enable_self_repay_loan_batch(acct(1), &[a, b], G).unwrap_err();
        assert_eq!(err, EscrowError::Resolver(ResolverError::Unavailable(acct(2))));
        assert!(!e.overrides.is_enabled(a));
    }
}
