//! Core ledger types: account and record identifiers, assets, lock balances.
//!
//! All token amounts are `u128` base units; all times are `u64` Unix seconds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A 32-byte account identifier (owner, receiver, penalty sink, distributor).
///
/// Text form is lowercase hex, which is also how it appears in config files.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The all-zero account. Used as the default penalty sink (burn).
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| format!("invalid account hex: {e}"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("account must be 32 bytes, got {}", v.len()))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for AccountId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Identifier of a lock record. Assigned monotonically starting at 1 and
/// never reused, even after the record becomes terminal.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reward stream. Each kind has its own allocation schedule and its own
/// per-record claim cursor.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct RewardKind(pub u32);

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind-{}", self.0)
    }
}

/// Which balance a value transfer moves.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub enum Asset {
    /// The token users lock into records.
    Locked,
    /// A reward token distributed under the given kind.
    Reward(RewardKind),
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => f.write_str("locked"),
            Self::Reward(kind) => write!(f, "reward:{kind}"),
        }
    }
}

/// The weight-relevant part of a lock record: what the checkpoint engine
/// needs to know to compute its contribution.
///
/// `end == 0` exactly when `is_permanent`. A terminal record is represented
/// by [`LockedBalance::EMPTY`].
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockedBalance {
    pub amount: u128,
    pub end: u64,
    pub is_permanent: bool,
}

impl LockedBalance {
    pub const EMPTY: Self = Self {
        amount: 0,
        end: 0,
        is_permanent: false,
    };

    pub fn temporary(amount: u128, end: u64) -> Self {
        Self {
            amount,
            end,
            is_permanent: false,
        }
    }

    pub fn permanent(amount: u128) -> Self {
        Self {
            amount,
            end: 0,
            is_permanent: true,
        }
    }

    /// A temporary balance whose end-time has been reached.
    pub fn is_expired(&self, now: u64) -> bool {
        !self.is_permanent && self.end <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_display_roundtrips() {
        let id = AccountId([0xAB; 32]);
        let text = id.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(text.parse::<AccountId>().unwrap(), id);
    }

    #[test]
    fn account_accepts_0x_prefix() {
        let id = AccountId([0x01; 32]);
        let text = format!("0x{id}");
        assert_eq!(text.parse::<AccountId>().unwrap(), id);
    }

    #[test]
    fn account_rejects_wrong_length() {
        let err = "abcd".parse::<AccountId>().unwrap_err();
        assert!(err.contains("32 bytes"), "{err}");
        assert!("zz".parse::<AccountId>().is_err());
    }

    #[test]
    fn account_serde_uses_hex_string() {
        let id = AccountId([0x11; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn zero_account() {
        assert!(AccountId::ZERO.is_zero());
        assert!(!AccountId([1; 32]).is_zero());
    }

    #[test]
    fn record_and_kind_display() {
        assert_eq!(RecordId(7).to_string(), "#7");
        assert_eq!(RewardKind(3).to_string(), "kind-3");
        assert_eq!(Asset::Reward(RewardKind(3)).to_string(), "reward:kind-3");
        assert_eq!(Asset::Locked.to_string(), "locked");
    }

    #[test]
    fn expiry_rules() {
        let lock = LockedBalance::temporary(10, 100);
        assert!(!lock.is_expired(99));
        assert!(lock.is_expired(100));
        assert!(!LockedBalance::permanent(10).is_expired(u64::MAX));
    }
}
