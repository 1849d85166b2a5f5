//! Account fields the settlement core reads.
//!
//! Identity verification and payout onboarding are run by external
//! providers; this core only reads the resulting statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Result of the identity-verification provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Approved => write!(f, "APPROVED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Onboarding state of the user's connected payout account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutAccountStatus {
    Pending,
    Restricted,
    Active,
}

impl std::fmt::Display for PayoutAccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Restricted => write!(f, "RESTRICTED"),
            Self::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Connected account on the external payout rail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutAccount {
    /// Processor-side account id (e.g. `acct_...`).
    pub account_ref: String,
    pub status: PayoutAccountStatus,
    pub updated_at: DateTime<Utc>,
}

/// A marketplace account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub verification_status: VerificationStatus,
    /// Server-side membership discount entitlement.
    pub membership_discount_active: bool,
    pub payout_account: Option<PayoutAccount>,
    /// Marketplace reputation, fed to fraud scoring.
    pub reputation: i32,
}

impl UserAccount {
    /// A freshly registered, unverified account.
    #[must_use]
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            verification_status: VerificationStatus::Pending,
            membership_discount_active: false,
            payout_account: None,
            reputation: 0,
        }
    }

    /// Whole days since registration.
    #[must_use]
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Approved
    }
}
