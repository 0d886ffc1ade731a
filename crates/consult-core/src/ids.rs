//! Type-safe numeric identifiers.
//!
//! Sessions, users and persisted messages are all keyed by integers issued
//! by the surrounding platform. Wrapping them keeps a session id from ever
//! being passed where a user id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw identifier.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw identifier.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|e| DomainError::parse($field, e))
            }
        }
    };
}

numeric_id!(
    /// Identifier of a consultation session.
    SessionId,
    "session_id"
);

numeric_id!(
    /// Identifier of a platform user (doctor or patient).
    UserId,
    "user_id"
);

numeric_id!(
    /// Server-assigned identifier of a persisted chat message.
    ///
    /// Ids increase monotonically within a session.
    MessageId,
    "message_id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!("42".parse::<SessionId>().unwrap(), SessionId::new(42));
        assert_eq!(" 7 ".parse::<UserId>().unwrap(), UserId::new(7));
    }

    #[test]
    fn test_parse_invalid_id() {
        let err = "abc".parse::<UserId>().unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse user_id"));
    }

    #[test]
    fn test_id_serializes_as_number() {
        let json = serde_json::to_string(&SessionId::new(42)).unwrap();
        assert_eq!(json, "42");

        let id: UserId = serde_json::from_str("9").unwrap();
        assert_eq!(id.get(), 9);
    }
}
