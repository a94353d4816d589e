//! Integer fixed-point helpers.
//!
//! Reward shares are `allocation * weight / total_weight`, carried at
//! [`REWARD_PRECISION`]. Both factors can approach 2^96, so the product is
//! formed in 256 bits and divided back down. No floating point anywhere.

use crate::constants::REWARD_PRECISION;
use crate::error::ConservationError;

/// Unsigned 256-bit value as four little-endian 64-bit limbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct U256([u64; 4]);

fn mul_u128_to_u256(a: u128, b: u128) -> U256 {
    let a_lo = a as u64;
    let a_hi = (a >> 64) as u64;
    let b_lo = b as u64;
    let b_hi = (b >> 64) as u64;

    let p0 = (a_lo as u128) * (b_lo as u128);
    let p1 = (a_lo as u128) * (b_hi as u128);
    let p2 = (a_hi as u128) * (b_lo as u128);
    let p3 = (a_hi as u128) * (b_hi as u128);

    let p0_lo = p0 as u64;
    let p0_hi = (p0 >> 64) as u64;

    // p1 + p2 can carry into bit 128.
    let (mid, mid_carry) = p1.overflowing_add(p2);
    let (mid, mid_carry2) = mid.overflowing_add(p0_hi as u128);
    let mid_lo = mid as u64;
    let mid_hi = (mid >> 64) as u64;
    let carry = ((mid_carry as u128) + (mid_carry2 as u128)) << 64;

    let hi = p3 + (mid_hi as u128) + carry;
    let hi_lo = hi as u64;
    let hi_hi = (hi >> 64) as u64;

    U256([p0_lo, mid_lo, hi_lo, hi_hi])
}

/// Long division of a 256-bit numerator by a non-zero 128-bit divisor.
///
/// Returns `(quotient, remainder)`, or `None` when the quotient does not fit
/// in 128 bits.
fn div_rem_u256(n: U256, d: u128) -> Option<(u128, u128)> {
    debug_assert!(d != 0);
    let mut q = [0u64; 4];
    let mut rem: u128 = 0;
    for i in (0..256).rev() {
        let bit = (n.0[i / 64] >> (i % 64)) & 1;
        let carry = rem >> 127;
        rem = (rem << 1) | bit as u128;
        // With the carry set the true value exceeds 2^128 > d, and the
        // difference is below d, so wrapping subtraction is exact.
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            q[i / 64] |= 1 << (i % 64);
        }
    }
    if q[2] != 0 || q[3] != 0 {
        return None;
    }
    Some(((q[1] as u128) << 64 | q[0] as u128, rem))
}

/// `floor(a * b / d)` together with the remainder `a * b mod d`.
///
/// # Errors
///
/// [`ConservationError::ArithmeticOverflow`] when `d == 0` or the quotient
/// exceeds `u128`.
pub fn mul_div_rem(a: u128, b: u128, d: u128) -> Result<(u128, u128), ConservationError> {
    if d == 0 {
        return Err(ConservationError::ArithmeticOverflow);
    }
    div_rem_u256(mul_u128_to_u256(a, b), d).ok_or(ConservationError::ArithmeticOverflow)
}

/// `floor(a * b / d)` with a 256-bit intermediate.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, ConservationError> {
    mul_div_rem(a, b, d).map(|(q, _)| q)
}

/// Running reward total split into whole base units and a fraction scaled by
/// [`REWARD_PRECISION`].
///
/// Equivalent to accumulating `floor(allocation * weight * PRECISION / total)`
/// per epoch in one big scaled integer, without needing more than 128 bits
/// for either half.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScaledAccumulator {
    whole: u128,
    fraction: u128,
}

impl ScaledAccumulator {
    /// Seed from a carried remainder. A remainder of one unit or more (which
    /// merges can produce) is normalized into whole units.
    pub fn from_remainder(remainder: u128) -> Self {
        Self {
            whole: remainder / REWARD_PRECISION,
            fraction: remainder % REWARD_PRECISION,
        }
    }

    /// Add the share `allocation * weight / total`.
    ///
    /// A zero `total` contributes nothing (no weight existed to earn it).
    pub fn add_share(
        &mut self,
        allocation: u128,
        weight: u128,
        total: u128,
    ) -> Result<(), ConservationError> {
        if total == 0 || weight == 0 || allocation == 0 {
            return Ok(());
        }
        let (q, r) = mul_div_rem(allocation, weight, total)?;
        let frac = mul_div(r, REWARD_PRECISION, total)?;
        self.whole = self
            .whole
            .checked_add(q)
            .ok_or(ConservationError::ArithmeticOverflow)?;
        self.fraction += frac;
        if self.fraction >= REWARD_PRECISION {
            self.fraction -= REWARD_PRECISION;
            self.whole = self
                .whole
                .checked_add(1)
                .ok_or(ConservationError::ArithmeticOverflow)?;
        }
        Ok(())
    }

    /// Whole base units claimable.
    pub fn whole(&self) -> u128 {
        self.whole
    }

    /// Leftover fraction, scaled by [`REWARD_PRECISION`]; always below it.
    pub fn fraction(&self) -> u128 {
        self.fraction
    }
}

/// Divide a carried remainder between two parts of a split record in exact
/// proportion to their amounts. The halves always sum to `remainder`.
pub fn split_remainder(
    remainder: u128,
    first_amount: u128,
    total_amount: u128,
) -> Result<(u128, u128), ConservationError> {
    let first = mul_div(remainder, first_amount, total_amount)?;
    Ok((first, remainder - first))
}
