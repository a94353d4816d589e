//! Escrow state snapshots.
//!
//! An [`EscrowSnapshot`] holds the full ledger state (records, checkpoint
//! histories, slope-change schedule, allocations, claims, overrides, and
//! config) and round-trips through bincode. Collaborators are not part of a
//! snapshot; [`Escrow::restore`] takes them as arguments.

use tracing::info;

use sluice_core::config::EscrowConfig;
use sluice_core::error::EscrowError;
use sluice_core::traits::{ReceiverResolver, ValueTransfer};
use sluice_decay::CheckpointEngine;

use crate::escrow::Escrow;
use crate::positions::PositionStore;
use crate::rewards::RewardLedger;
use crate::self_repay::SelfRepayRegistry;

/// Current snapshot layout version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable escrow state.
#[derive(Clone, Debug, bincode::Encode, bincode::Decode)]
pub struct EscrowSnapshot {
    pub version: u32,
    pub config: EscrowConfig,
    pub positions: PositionStore,
    pub engine: CheckpointEngine,
    pub rewards: RewardLedger,
    pub overrides: SelfRepayRegistry,
}

impl EscrowSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EscrowError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| EscrowError::Snapshot(format!("encode: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EscrowError> {
        let (snapshot, read): (Self, usize) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| EscrowError::Snapshot(format!("decode: {e}")))?;
        if read != bytes.len() {
            return Err(EscrowError::Snapshot(format!(
                "trailing bytes: read {read} of {}",
                bytes.len()
            )));
        }
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EscrowError::Snapshot(format!(
                "unsupported version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }
}

impl<B: ValueTransfer, R: ReceiverResolver> Escrow<B, R> {
    /// Copy of the current ledger state.
    pub fn snapshot(&self) -> EscrowSnapshot {
        EscrowSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            positions: self.positions.clone(),
            engine: self.engine.clone(),
            rewards: self.rewards.clone(),
            overrides: self.overrides.clone(),
        }
    }

    /// Rebuild an escrow from a snapshot and fresh collaborators.
    ///
    /// # Errors
    ///
    /// - invalid config
    /// - [`ConservationError::SupplyMismatch`](sluice_core::error::ConservationError::SupplyMismatch)
    ///   if the record table disagrees with its tracked supply
    pub fn restore(snapshot: EscrowSnapshot, bank: B, resolver: R) -> Result<Self, EscrowError> {
        snapshot.config.validate()?;
        snapshot.positions.verify_supply()?;
        info!(
            records = snapshot.positions.len(),
            last_checkpoint = snapshot.engine.last_point().timestamp,
            "escrow restored from snapshot"
        );
        Ok(Self {
            config: snapshot.config,
            positions: snapshot.positions,
            engine: snapshot.engine,
            rewards: snapshot.rewards,
            overrides: snapshot.overrides,
            bank,
            resolver,
        })
    }
}
