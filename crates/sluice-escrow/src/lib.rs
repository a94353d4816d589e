//! # sluice-escrow: Time-locked escrow with epoch reward distribution.
//!
//! [`Escrow`] is the single entry point. It combines:
//! - [`positions`]: the lock record table with approvals and split permissions
//! - [`sluice_decay::CheckpointEngine`]: weight history for every record
//! - [`rewards`]: per-epoch allocations and per-record claim cursors
//! - [`self_repay`]: reward redirection overrides
//!
//! Operations are grouped by concern: lock lifecycle in `lifecycle`,
//! notification and claims in `claims`, read-only queries in `views`.
//! Token movement and receiver resolution are delegated to the
//! [`ValueTransfer`](sluice_core::traits::ValueTransfer) and
//! [`ReceiverResolver`](sluice_core::traits::ReceiverResolver) collaborators.

mod claims;
pub mod escrow;
pub mod handle;
pub mod lifecycle;
pub mod positions;
pub mod rewards;
pub mod self_repay;
pub mod snapshot;
mod views;

pub use escrow::Escrow;
pub use handle::EscrowHandle;
pub use lifecycle::{Reshape, Withdrawal};
pub use positions::{LockRecord, LockState};
pub use rewards::{ClaimState, RewardPayout};
pub use snapshot::EscrowSnapshot;
