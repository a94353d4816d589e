//! Ledger constants. All token amounts are in base units (1 token = 10^18 base units).

/// Base units per whole token.
pub const COIN: u128 = 1_000_000_000_000_000_000;

pub const DAY: u64 = 86_400;

/// Length of one reward epoch and of one checkpoint replay bucket.
///
/// Lock end-times are always aligned to this grid, so scheduled slope
/// changes only ever land on epoch boundaries.
pub const EPOCH_DURATION: u64 = 7 * DAY;

/// Longest possible lock. Also the denominator of the decay law:
/// `weight = amount * (end - t) / MAX_LOCK_DURATION`.
pub const MAX_LOCK_DURATION: u64 = 4 * 365 * DAY;

pub const MIN_LOCK_DURATION: u64 = EPOCH_DURATION;

/// Scale of the carried reward remainder (fractional base units).
pub const REWARD_PRECISION: u128 = 1_000_000_000_000_000_000;

pub const BPS_PRECISION: u64 = 10_000;

/// Hard cap on total locked supply, in base units (~79 billion tokens).
///
/// Keeps `amount * MAX_LOCK_DURATION` inside `i128`, which is what lets the
/// checkpoint engine store bias in amount-seconds without overflow checks
/// failing in practice.
pub const MAX_LOCKED_SUPPLY: u128 = 1 << 96;

pub const DEFAULT_PENALTY_RATE_BPS: u64 = 5_000;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
/// Ten years of weekly epochs.
pub const DEFAULT_MAX_CLAIM_EPOCHS: u64 = 520;
pub const DEFAULT_MAX_REPLAY_STEPS: u64 = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_lock_is_whole_days() {
        assert_eq!(MAX_LOCK_DURATION % DAY, 0);
        assert_eq!(MAX_LOCK_DURATION, 126_144_000);
    }

    #[test]
    fn min_lock_fits_in_max() {
        assert!(MIN_LOCK_DURATION <= MAX_LOCK_DURATION);
        assert_eq!(MIN_LOCK_DURATION, EPOCH_DURATION);
    }

    #[test]
    fn scaled_bias_fits_i128() {
        let max_bias = MAX_LOCKED_SUPPLY
            .checked_mul(MAX_LOCK_DURATION as u128)
            .unwrap();
        assert!(max_bias < i128::MAX as u128);
    }

    #[test]
    fn default_replay_covers_max_lock() {
        // A full replay pass spans longer than any lock, so one call always
        // reaches the point where every scheduled change has fired.
        assert!(DEFAULT_MAX_REPLAY_STEPS * EPOCH_DURATION > MAX_LOCK_DURATION);
    }

    #[test]
    fn penalty_rate_within_bps() {
        assert!(DEFAULT_PENALTY_RATE_BPS <= BPS_PRECISION);
    }
}
