//! Escrow configuration.
//!
//! Provides [`EscrowConfig`] with defaults matching the ledger constants.
//! Every field can be overridden from a config file or environment (the
//! scenario runner loads it through the `config` crate); the escrow also
//! exposes runtime setters for the admin-adjustable subset.

use serde::{Deserialize, Serialize};

use crate::constants::{
    BPS_PRECISION, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_CLAIM_EPOCHS, DEFAULT_MAX_REPLAY_STEPS,
    DEFAULT_PENALTY_RATE_BPS, MAX_LOCK_DURATION, MIN_LOCK_DURATION,
};
use crate::error::ValidationError;
use crate::types::AccountId;

/// Configuration for an escrow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(default)]
pub struct EscrowConfig {
    /// Shortest accepted lock duration in seconds; shorter requests are raised to it.
    pub min_lock_duration: u64,
    /// Longest accepted lock duration in seconds; longer requests are cut to it.
    pub max_lock_duration: u64,
    /// Early-withdraw penalty at full remaining duration, in basis points.
    pub penalty_rate_bps: u64,
    /// Receiver of early-withdraw penalties.
    pub penalty_sink: AccountId,
    /// Largest accepted batch (claims, self-repay toggles, notify batches).
    pub max_batch_size: usize,
    /// Most epoch boundaries a single claim may walk.
    pub max_claim_epochs: u64,
    /// Most epoch buckets a single checkpoint or weight replay may walk.
    pub max_replay_steps: u64,
    /// Whether every owner may split without an individual grant.
    pub split_allowed_for_all: bool,
    /// Accounts allowed to notify rewards.
    pub distributors: Vec<AccountId>,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            min_lock_duration: MIN_LOCK_DURATION,
            max_lock_duration: MAX_LOCK_DURATION,
            penalty_rate_bps: DEFAULT_PENALTY_RATE_BPS,
            penalty_sink: AccountId::ZERO,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_claim_epochs: DEFAULT_MAX_CLAIM_EPOCHS,
            max_replay_steps: DEFAULT_MAX_REPLAY_STEPS,
            split_allowed_for_all: false,
            distributors: Vec::new(),
        }
    }
}

impl EscrowConfig {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_lock_duration == 0 {
            return Err(ValidationError::InvalidConfig(
                "min_lock_duration must be non-zero".into(),
            ));
        }
        if self.min_lock_duration > self.max_lock_duration {
            return Err(ValidationError::InvalidConfig(format!(
                "min_lock_duration {} > max_lock_duration {}",
                self.min_lock_duration, self.max_lock_duration
            )));
        }
        if self.max_lock_duration > MAX_LOCK_DURATION {
            return Err(ValidationError::InvalidConfig(format!(
                "max_lock_duration {} > {}",
                self.max_lock_duration, MAX_LOCK_DURATION
            )));
        }
        if self.penalty_rate_bps > BPS_PRECISION {
            return Err(ValidationError::InvalidConfig(format!(
                "penalty_rate_bps {} > {}",
                self.penalty_rate_bps, BPS_PRECISION
            )));
        }
        if self.max_batch_size == 0 {
            return Err(ValidationError::InvalidConfig("max_batch_size must be non-zero".into()));
        }
        if self.max_claim_epochs == 0 {
            return Err(ValidationError::InvalidConfig("max_claim_epochs must be non-zero".into()));
        }
        if self.max_replay_steps == 0 {
            return Err(ValidationError::InvalidConfig("max_replay_steps must be non-zero".into()));
        }
        Ok(())
    }
}
