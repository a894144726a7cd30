use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Persistence status of a reference.
///
/// The ordinary statuses form a chain
/// `Unknown < Stored < Persisted < Verified < Announced`; a reference only
/// ever moves up this chain. `Embedded` marks values that live inline in
/// their parent's encoding and are never stored on their own, and `Invalid`
/// marks a reference explicitly invalidated by its owner. Both are terminal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum RefStatus {
    /// Nothing is known about the value's presence in any store.
    #[default]
    Unknown = 0,
    /// The value's own encoding is in the store; children may not be.
    Stored = 1,
    /// The value and every descendant are in the store.
    Persisted = 2,
    /// The value's descendants have been validated.
    Verified = 3,
    /// The value has been announced to peers.
    Announced = 4,
    /// The value is inlined in its parent and never stored separately.
    Embedded = 5,
    /// The reference was explicitly invalidated.
    Invalid = 6,
}

impl RefStatus {
    /// Numeric code of this status.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a numeric status code.
    pub fn from_u8(code: u8) -> Result<Self, TypeError> {
        match code {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Stored),
            2 => Ok(Self::Persisted),
            3 => Ok(Self::Verified),
            4 => Ok(Self::Announced),
            5 => Ok(Self::Embedded),
            6 => Ok(Self::Invalid),
            other => Err(TypeError::InvalidStatus(other)),
        }
    }

    /// Returns `true` if a store may record an object at this status.
    pub fn is_storable(self) -> bool {
        matches!(
            self,
            Self::Stored | Self::Persisted | Self::Verified | Self::Announced
        )
    }

    /// Returns `true` if lowering from this status is an error.
    pub fn is_locked(self) -> bool {
        self >= Self::Verified
    }
}

impl fmt::Display for RefStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Stored => "stored",
            Self::Persisted => "persisted",
            Self::Verified => "verified",
            Self::Announced => "announced",
            Self::Embedded => "embedded",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_ordered() {
        assert!(RefStatus::Unknown < RefStatus::Stored);
        assert!(RefStatus::Stored < RefStatus::Persisted);
        assert!(RefStatus::Persisted < RefStatus::Verified);
        assert!(RefStatus::Verified < RefStatus::Announced);
    }

    #[test]
    fn code_roundtrip() {
        for code in 0..=6u8 {
            let status = RefStatus::from_u8(code).unwrap();
            assert_eq!(status.as_u8(), code);
        }
        assert_eq!(RefStatus::from_u8(7), Err(TypeError::InvalidStatus(7)));
    }

    #[test]
    fn storable_statuses() {
        assert!(RefStatus::Persisted.is_storable());
        assert!(!RefStatus::Unknown.is_storable());
        assert!(!RefStatus::Embedded.is_storable());
    }

    #[test]
    fn locked_from_verified() {
        assert!(!RefStatus::Persisted.is_locked());
        assert!(RefStatus::Verified.is_locked());
        assert!(RefStatus::Announced.is_locked());
    }

    #[test]
    fn display_names() {
        assert_eq!(RefStatus::Persisted.to_string(), "persisted");
        assert_eq!(RefStatus::default(), RefStatus::Unknown);
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&RefStatus::Announced).unwrap();
        let parsed: RefStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, RefStatus::Announced);
    }
}
