//! Epoch grid arithmetic.
//!
//! Time is bucketed into fixed [`EPOCH_DURATION`] epochs starting at Unix
//! time 0. An epoch is identified by its start timestamp (its *boundary*).
//!
//! - Lock end-times are rounded down onto the grid.
//! - Rewards notified during an epoch activate at the next boundary.
//! - Checkpoint replay walks the grid one boundary at a time.

use crate::constants::EPOCH_DURATION;

/// Start of the epoch containing `t`.
pub fn epoch_start(t: u64) -> u64 {
    t - t % EPOCH_DURATION
}

/// First epoch boundary strictly after `t`.
///
/// Saturates at the last representable boundary instead of overflowing.
pub fn next_epoch_boundary(t: u64) -> u64 {
    epoch_start(t).saturating_add(EPOCH_DURATION)
}

/// Number of epoch boundaries `e` with `after < e <= upto`.
///
/// Returns 0 when `upto <= after`.
pub fn boundaries_between(after: u64, upto: u64) -> u64 {
    if upto <= after {
        return 0;
    }
    (epoch_start(upto) - epoch_start(after)) / EPOCH_DURATION
}

/// End-time of a lock started at `now` for `duration` seconds, rounded down
/// onto the epoch grid. The caller checks the result is after `now`.
pub fn lock_end(now: u64, duration: u64) -> u64 {
    epoch_start(now.saturating_add(duration))
}
