//! Donation review state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::DonationId;

/// Review state of a donation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    /// Submitted, awaiting staff review.
    #[default]
    Unreviewed,

    /// Accepted; the donor's balance has been credited.
    Completed,

    /// Rejected; any earlier credit was reversed.
    Rejected,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Unreviewed => "UNREVIEWED",
            DonationStatus::Completed => "COMPLETED",
            DonationStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNREVIEWED" => Some(DonationStatus::Unreviewed),
            "COMPLETED" => Some(DonationStatus::Completed),
            "REJECTED" => Some(DonationStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger side-effect a review transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Credit the donor with the donation's price.
    Grant,

    /// Reverse an earlier credit.
    Revoke,
}

impl LedgerEffect {
    /// Signed delta for a donation of the given price.
    pub fn signed_delta(&self, price_amount: Decimal) -> Decimal {
        match self {
            LedgerEffect::Grant => price_amount,
            LedgerEffect::Revoke => -price_amount,
        }
    }
}

/// Result of reviewing one donation: the new value plus any ledger effect.
#[derive(Debug, Clone)]
pub struct ReviewTransition {
    pub donation: Donation,
    pub effect: Option<LedgerEffect>,
}

/// A physical donation dropped off at a collection point.
///
/// The donor identifies themselves by the code printed on the drop-off
/// receipt; the code is resolved to an account at review time, so it may be
/// absent or never claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: DonationId,
    /// Human-facing donation number.
    pub number: i32,
    /// External donor code, resolved to an account at review time.
    pub donator_code: Option<String>,
    /// Receipt barcode, unique when present.
    pub barcode: Option<String>,
    pub price_amount: Decimal,
    pub quantity: i32,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Donation {
    /// Applies one staff review decision.
    ///
    /// The transition table is status-sensitive so that re-reviews reverse
    /// earlier effects exactly once:
    ///
    /// | from       | accepted | to        | ledger effect |
    /// |------------|----------|-----------|---------------|
    /// | Unreviewed | yes      | Completed | +price        |
    /// | Unreviewed | no       | Rejected  | none          |
    /// | Completed  | yes      | Completed | none          |
    /// | Completed  | no       | Rejected  | −price        |
    /// | Rejected   | yes      | Completed | +price        |
    /// | Rejected   | no       | Rejected  | none          |
    pub fn review(&self, accepted: bool, now: DateTime<Utc>) -> ReviewTransition {
        let (status, effect) = match (self.status, accepted) {
            (DonationStatus::Unreviewed, true) => {
                (DonationStatus::Completed, Some(LedgerEffect::Grant))
            }
            (DonationStatus::Unreviewed, false) => (DonationStatus::Rejected, None),
            (DonationStatus::Completed, true) => (DonationStatus::Completed, None),
            (DonationStatus::Completed, false) => {
                (DonationStatus::Rejected, Some(LedgerEffect::Revoke))
            }
            (DonationStatus::Rejected, true) => {
                (DonationStatus::Completed, Some(LedgerEffect::Grant))
            }
            (DonationStatus::Rejected, false) => (DonationStatus::Rejected, None),
        };

        ReviewTransition {
            donation: Donation {
                status,
                updated_at: now,
                ..self.clone()
            },
            effect,
        }
    }
}
