//! In-memory collaborators for tests and the scenario runner.
//!
//! [`MemoryBank`] keeps per-account balances and the escrow's custody per
//! asset in `HashMap`s. [`MemoryResolver`] derives one receiver per owner on
//! first use. Neither persists anything.

use std::collections::{HashMap, HashSet};

use crate::error::{ResolverError, TransferError};
use crate::traits::{ReceiverResolver, Transfer, ValueTransfer};
use crate::types::{AccountId, Asset};

/// In-memory token ledger with an escrow custody account per asset.
#[derive(Debug, Clone, Default)]
pub struct MemoryBank {
    balances: HashMap<(Asset, AccountId), u128>,
    custody: HashMap<Asset, u128>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` of `asset` to `account` (test/scenario funding).
    pub fn credit(&mut self, asset: Asset, account: AccountId, amount: u128) {
        *self.balances.entry((asset, account)).or_default() += amount;
    }

    pub fn balance(&self, asset: Asset, account: &AccountId) -> u128 {
        self.balances.get(&(asset, *account)).copied().unwrap_or(0)
    }

    /// Amount of `asset` currently held by the escrow.
    pub fn custody(&self, asset: Asset) -> u128 {
        self.custody.get(&asset).copied().unwrap_or(0)
    }
}

impl ValueTransfer for MemoryBank {
    fn execute(&mut self, transfers: &[Transfer]) -> Result<(), TransferError> {
        // Stage every change first so a failure part-way leaves no trace.
        let mut balances: HashMap<(Asset, AccountId), u128> = HashMap::new();
        let mut custody: HashMap<Asset, u128> = HashMap::new();

        for transfer in transfers {
            match *transfer {
                Transfer::Deposit { asset, from, amount } => {
                    let have = *balances
                        .entry((asset, from))
                        .or_insert_with(|| self.balance(asset, &from));
                    if have < amount {
                        return Err(TransferError::InsufficientBalance {
                            account: from,
                            asset,
                            have,
                            need: amount,
                        });
                    }
                    balances.insert((asset, from), have - amount);
                    let held = custody.entry(asset).or_insert_with(|| self.custody(asset));
                    *held += amount;
                }
                Transfer::Payout { asset, to, amount } => {
                    let held = *custody.entry(asset).or_insert_with(|| self.custody(asset));
                    if held < amount {
                        return Err(TransferError::InsufficientCustody {
                            asset,
                            have: held,
                            need: amount,
                        });
                    }
                    custody.insert(asset, held - amount);
                    let bal = balances
                        .entry((asset, to))
                        .or_insert_with(|| self.balance(asset, &to));
                    *bal += amount;
                }
            }
        }

        self.balances.extend(balances);
        self.custody.extend(custody);
        Ok(())
    }
}

/// Derives a deterministic receiver per owner on first request.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    receivers: HashMap<AccountId, AccountId>,
    unavailable: HashSet<AccountId>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make resolution fail for `owner`.
    pub fn mark_unavailable(&mut self, owner: AccountId) {
        self.unavailable.insert(owner);
    }

    /// The receiver already created for `owner`, if any.
    pub fn receiver_of(&self, owner: &AccountId) -> Option<AccountId> {
        self.receivers.get(owner).copied()
    }

    /// The receiver that would be created for `owner`.
    pub fn derive(owner: &AccountId) -> AccountId {
        let mut bytes = owner.0;
        bytes.reverse();
        for b in &mut bytes {
            *b ^= 0x5A;
        }
        AccountId(bytes)
    }
}

impl ReceiverResolver for MemoryResolver {
    fn resolve(&mut self, owner: &AccountId) -> Result<AccountId, ResolverError> {
        if self.unavailable.contains(owner) {
            return Err(ResolverError::Unavailable(*owner));
        }
        Ok(*self
            .receivers
            .entry(*owner)
            .or_insert_with(|| Self::derive(owner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RewardKind;

    fn acct(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    #[test]
    fn deposit_moves_into_custody() {
        let mut bank = MemoryBank::new();
        bank.credit(Asset::Locked, acct(1), 100);
        bank.deposit(Asset::Locked, acct(1), 40).unwrap();
        assert_eq!(bank.balance(Asset::Locked, &acct(1)), 60);
        assert_eq!(bank.custody(Asset::Locked), 40);
    }

    #[test]
    fn payout_moves_out_of_custody() {
        let mut bank = MemoryBank::new();
        bank.credit(Asset::Locked, acct(1), 100);
        bank.deposit(Asset::Locked, acct(1), 100).unwrap();
        bank.payout(Asset::Locked, acct(2), 30).unwrap();
        assert_eq!(bank.balance(Asset::Locked, &acct(2)), 30);
        assert_eq!(bank.custody(Asset::Locked), 70);
    }

    #[test]
    fn failed_batch_leaves_no_trace() {
        let mut bank = MemoryBank::new();
        bank.credit(Asset::Locked, acct(1), 10);
        let err = bank
            .execute(&[
                Transfer::Deposit { asset: Asset::Locked, from: acct(1), amount: 10 },
                Transfer::Payout { asset: Asset::Locked, to: acct(2), amount: 11 },
            ])
            .unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientCustody { asset: Asset::Locked, have: 10, need: 11 }
        );
        assert_eq!(bank.balance(Asset::Locked, &acct(1)), 10);
        assert_eq!(bank.custody(Asset::Locked), 0);
    }

    #[test]
    fn insufficient_balance_reports_amounts() {
        let mut bank = MemoryBank::new();
        let kind = Asset::Reward(RewardKind(1));
        bank.credit(kind, acct(3), 5);
        let err = bank.deposit(kind, acct(3), 6).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientBalance { account: acct(3), asset: kind, have: 5, need: 6 }
        );
    }

    #[test]
    fn sequential_transfers_see_staged_state() {
        let mut bank = MemoryBank::new();
        bank.credit(Asset::Locked, acct(1), 10);
        bank.execute(&[
            Transfer::Deposit { asset: Asset::Locked, from: acct(1), amount: 10 },
            Transfer::Payout { asset: Asset::Locked, to: acct(1), amount: 4 },
            Transfer::Payout { asset: Asset::Locked, to: acct(2), amount: 6 },
        ])
        .unwrap();
        assert_eq!(bank.balance(Asset::Locked, &acct(1)), 4);
        assert_eq!(bank.balance(Asset::Locked, &acct(2)), 6);
        assert_eq!(bank.custody(Asset::Locked), 0);
    }

    #[test]
    fn resolver_is_stable_and_lazy() {
        let mut r = MemoryResolver::new();
        assert_eq!(r.receiver_of(&acct(1)), None);
        let first = r.resolve(&acct(1)).unwrap();
        assert_eq!(r.resolve(&acct(1)).unwrap(), first);
        assert_eq!(r.receiver_of(&acct(1)), Some(first));
        assert_ne!(first, acct(1));
        assert_eq!(first, MemoryResolver::derive(&acct(1)));
    }

    #[test]
    fn resolver_failure() {
        let mut r = MemoryResolver::new();
        r.mark_unavailable(acct(9));
        assert_eq!(r.resolve(&acct(9)), Err(ResolverError::Unavailable(acct(9))));
    }
}
