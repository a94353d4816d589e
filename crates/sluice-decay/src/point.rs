//! Checkpoint records and the per-lock contribution they are built from.

use serde::{Deserialize, Serialize};

use sluice_core::constants::MAX_LOCK_DURATION;
use sluice_core::error::ConservationError;
use sluice_core::types::LockedBalance;

/// What one lock adds to the aggregate at a given instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Contribution {
    /// Remaining amount-seconds: `amount * (end - now)`.
    pub bias: i128,
    /// Amount-seconds lost per second: the decaying amount.
    pub slope: i128,
    /// Non-decaying weight.
    pub permanent: u128,
}

impl Contribution {
    /// Contribution of `balance` at `now`.
    ///
    /// Expired temporary locks and [`LockedBalance::EMPTY`] contribute nothing.
    pub fn at(balance: &LockedBalance, now: u64) -> Result<Self, ConservationError> {
        if balance.is_permanent {
            return Ok(Self {
                permanent: balance.amount,
                ..Self::default()
            });
        }
        if balance.end <= now || balance.amount == 0 {
            return Ok(Self::default());
        }
        let slope = i128::try_from(balance.amount).map_err(|_| ConservationError::ArithmeticOverflow)?;
        let bias = slope
            .checked_mul((balance.end - now) as i128)
            .ok_or(ConservationError::ArithmeticOverflow)?;
        Ok(Self {
            bias,
            slope,
            permanent: 0,
        })
    }
}

/// Per-record checkpoint. Append-only history per record.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct UserPoint {
    pub bias: i128,
    pub slope: i128,
    pub timestamp: u64,
    /// Engine-wide monotonic counter; orders points written in the same second.
    pub sequence: u64,
    pub permanent: u128,
}

impl UserPoint {
    /// Weight of this record at `t >= timestamp`.
    pub fn weight_at(&self, t: u64) -> u128 {
        weight_from_bias(decayed_bias(self.bias, self.slope, self.timestamp, t)) + self.permanent
    }
}

/// Aggregate checkpoint over all records.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct GlobalPoint {
    pub bias: i128,
    pub slope: i128,
    pub timestamp: u64,
    pub sequence: u64,
    pub permanent_lock_total: u128,
}

impl GlobalPoint {
    /// Total weight at `timestamp`.
    pub fn weight(&self) -> u128 {
        weight_from_bias(self.bias) + self.permanent_lock_total
    }
}

/// `max(0, bias - slope * (t - from))`.
///
/// Saturating arithmetic is exact here: any saturation means the true
/// value is far below zero, which clamps to zero anyway.
pub fn decayed_bias(bias: i128, slope: i128, from: u64, t: u64) -> i128 {
    let elapsed = t.saturating_sub(from) as i128;
    bias.saturating_sub(slope.saturating_mul(elapsed)).max(0)
}

/// Convert amount-seconds to weight units (floor).
pub fn weight_from_bias(bias: i128) -> u128 {
    bias.max(0) as u128 / MAX_LOCK_DURATION as u128
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::constants::COIN;

    const M: u64 = MAX_LOCK_DURATION;

    #[test]
    fn temporary_contribution() {
        let c = Contribution::at(&LockedBalance::temporary(10 * COIN, 1_000), 400).unwrap();
        assert_eq!(c.slope, (10 * COIN) as i128);
        assert_eq!(c.bias, (10 * COIN) as i128 * 600);
        assert_eq!(c.permanent, 0);
    }

    #[test]
    fn expired_contributes_nothing() {
        let lock = LockedBalance::temporary(10 * COIN, 1_000);
        assert_eq!(Contribution::at(&lock, 1_000).unwrap(), Contribution::default());
        assert_eq!(Contribution::at(&lock, 5_000).unwrap(), Contribution::default());
        assert_eq!(Contribution::at(&LockedBalance::EMPTY, 0).unwrap(), Contribution::default());
    }

    #[test]
    fn permanent_contribution() {
        let c = Contribution::at(&LockedBalance::permanent(3 * COIN), 99).unwrap();
        assert_eq!(c, Contribution { bias: 0, slope: 0, permanent: 3 * COIN });
    }

    #[test]
    fn oversized_amount_is_reported() {
        let lock = LockedBalance::temporary(u128::MAX, 10);
        assert_eq!(Contribution::at(&lock, 0), Err(ConservationError::ArithmeticOverflow));
    }

    #[test]
    fn decay_law_is_exact() {
        let amount = 7 * COIN + 3;
        let end = M;
        let c = Contribution::at(&LockedBalance::temporary(amount, end), 0).unwrap();
        let p = UserPoint { bias: c.bias, slope: c.slope, timestamp: 0, sequence: 0, permanent: 0 };
        for t in [0, 1, M / 3, M / 2, M - 1] {
            let expected = amount * (end - t) as u128 / M as u128;
            assert_eq!(p.weight_at(t), expected, "t = {t}");
        }
        assert_eq!(p.weight_at(end), 0);
        assert_eq!(p.weight_at(end + 12345), 0);
    }

    #[test]
    fn decayed_bias_clamps_and_saturates() {
        assert_eq!(decayed_bias(100, 1, 0, 50), 50);
        assert_eq!(decayed_bias(100, 1, 0, 500), 0);
        assert_eq!(decayed_bias(i128::MAX / 2, i128::MAX / 2, 0, u64::MAX), 0);
        // t before `from` is treated as no elapsed time.
        assert_eq!(decayed_bias(100, 1, 10, 5), 100);
    }

    #[test]
    fn global_weight_adds_permanent() {
        let g = GlobalPoint {
            bias: (M as i128) * 5,
            slope: 0,
            timestamp: 0,
            sequence: 0,
            permanent_lock_total: 7,
        };
        assert_eq!(g.weight(), 12);
    }
}
