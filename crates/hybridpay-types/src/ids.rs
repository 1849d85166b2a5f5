//! Globally unique identifiers used throughout HybridPay.
//!
//! All entity IDs use UUIDv7 for time-ordered lexicographic sorting.
//! [`OrderNumber`] is the human-readable counterpart shown to buyers and sellers.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUIDv7-backed identifier newtype with a display prefix.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        /// Accepts the display form or a bare UUID.
        impl std::str::FromStr for $name {
            type Err = crate::HybridPayError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let raw = s.strip_prefix($prefix).unwrap_or(s);
                Uuid::parse_str(raw)
                    .map(Self)
                    .map_err(|e| crate::HybridPayError::Validation {
                        reason: format!(concat!("invalid ", stringify!($name), " {:?}: {}"), s, e),
                    })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a marketplace account.
    UserId,
    "user:"
);

uuid_id!(
    /// Wallet identifier. Exactly one wallet exists per [`UserId`].
    WalletId,
    "wallet:"
);

uuid_id!(
    /// Internal order identifier. See [`OrderNumber`] for the display form.
    OrderId,
    "order:"
);

uuid_id!(
    /// Catalog listing identifier. Listings are owned by the catalog layer.
    ListingId,
    "listing:"
);

uuid_id!(
    /// Payout request identifier.
    WithdrawalId,
    "wd:"
);

uuid_id!(
    /// Ledger entry identifier.
    TransactionId,
    "tx:"
);

uuid_id!(
    /// Order timeline entry identifier.
    TimelineEntryId,
    "tl:"
);

uuid_id!(
    /// Notification record identifier.
    NotificationId,
    "ntf:"
);

// ---------------------------------------------------------------------------
// OrderNumber
// ---------------------------------------------------------------------------

/// Alphabet for the random suffix. Excludes look-alike characters (0/O, 1/I).
const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random suffix of an [`OrderNumber`].
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;

/// Human-readable, globally unique order reference, e.g. `HP-20261016-K7QX2M`.
///
/// Uniqueness is enforced by the ledger store on insert; generation only
/// makes collisions improbable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    /// Generate a new order number for the given creation time.
    #[must_use]
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..ORDER_NUMBER_ALPHABET.len());
                char::from(ORDER_NUMBER_ALPHABET[idx])
            })
            .collect();
        Self(format!("HP-{}-{suffix}", at.format("%Y%m%d")))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_uniqueness() {
        let a = OrderId::new();
        let b = OrderId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert!(a < b);
    }

    #[test]
    fn display_carries_prefix() {
        let id = WithdrawalId::new();
        assert!(id.to_string().starts_with("wd:"));
        assert!(UserId::new().to_string().starts_with("user:"));
    }

    #[test]
    fn parses_display_and_bare_forms() {
        let id = WithdrawalId::new();
        assert_eq!(id.to_string().parse::<WithdrawalId>().unwrap(), id);
        assert_eq!(id.0.to_string().parse::<WithdrawalId>().unwrap(), id);
        assert!("wd:not-a-uuid".parse::<WithdrawalId>().is_err());
    }

    #[test]
    fn order_number_shape() {
        let at = DateTime::parse_from_rfc3339("2026-10-16T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = OrderNumber::generate(at);
        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "HP");
        assert_eq!(parts[1], "20261016");
        assert_eq!(parts[2].len(), ORDER_NUMBER_SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| ORDER_NUMBER_ALPHABET.contains(&b)));
    }

    #[test]
    fn serde_roundtrip() {
        let oid = OrderId::new();
        let json = serde_json::to_string(&oid).unwrap();
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(oid, back);
    }
}
