//! Collaborator interfaces consumed by the escrow core.
//!
//! - [`ValueTransfer`]: moves tokens between accounts and escrow custody
//!   ([`MemoryBank`](crate::bank::MemoryBank) implements it in memory)
//! - [`ReceiverResolver`]: maps an owner to the account that receives
//!   redirected (self-repay) rewards
//!   ([`MemoryResolver`](crate::bank::MemoryResolver) implements it in memory)

use serde::{Deserialize, Serialize};

use crate::error::{ResolverError, TransferError};
use crate::types::{AccountId, Asset};

/// One movement of value across the escrow boundary.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transfer {
    /// Pull `amount` of `asset` from `from` into escrow custody.
    Deposit { asset: Asset, from: AccountId, amount: u128 },
    /// Pay `amount` of `asset` out of escrow custody to `to`.
    Payout { asset: Asset, to: AccountId, amount: u128 },
}

impl Transfer {
    pub fn amount(&self) -> u128 {
        match self {
            Self::Deposit { amount, .. } | Self::Payout { amount, .. } => *amount,
        }
    }
}

/// Token movement primitive.
///
/// The core trusts the reported outcome: `Ok` means every transfer in the
/// slice happened with exactly the stated amounts.
pub trait ValueTransfer {
    /// Apply all `transfers` in order, or none of them.
    ///
    /// Implementations must leave balances untouched when returning an error.
    fn execute(&mut self, transfers: &[Transfer]) -> Result<(), TransferError>;

    /// Single deposit. Default implementation delegates to [`execute`](Self::execute).
    fn deposit(&mut self, asset: Asset, from: AccountId, amount: u128) -> Result<(), TransferError> {
        self.execute(&[Transfer::Deposit { asset, from, amount }])
    }

    /// Single payout. Default implementation delegates to [`execute`](Self::execute).
    fn payout(&mut self, asset: Asset, to: AccountId, amount: u128) -> Result<(), TransferError> {
        self.execute(&[Transfer::Payout { asset, to, amount }])
    }
}

/// Resolves (or lazily creates) the receiver account for an owner's
/// redirected rewards. Failure is reported to the caller as-is.
pub trait ReceiverResolver {
    fn resolve(&mut self, owner: &AccountId) -> Result<AccountId, ResolverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RewardKind;

    struct Recorder(Vec<Transfer>);

    impl ValueTransfer for Recorder {
        fn execute(&mut self, transfers: &[Transfer]) -> Result<(), TransferError> {
            self.0.extend_from_slice(transfers);
            Ok(())
        }
    }

    #[test]
    fn default_helpers_delegate_to_execute() {
        let mut r = Recorder(Vec::new());
        let who = AccountId([1; 32]);
        r.deposit(Asset::Locked, who, 5).unwrap();
        r.payout(Asset::Reward(RewardKind(1)), who, 3).unwrap();
        assert_eq!(
            r.0,
            vec![
                Transfer::Deposit { asset: Asset::Locked, from: who, amount: 5 },
                Transfer::Payout { asset: Asset::Reward(RewardKind(1)), to: who, amount: 3 },
            ]
        );
        assert_eq!(r.0[0].amount(), 5);
    }

    #[test]
    fn value_transfer_is_object_safe() {
        let mut r = Recorder(Vec::new());
        let dyn_r: &mut dyn ValueTransfer = &mut r;
        dyn_r.execute(&[]).unwrap();
    }
}
