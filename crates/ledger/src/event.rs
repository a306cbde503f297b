use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::AccountId;

/// Unique identifier for a balance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of balance mutation a ledger event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceEventType {
    /// One-time welcome credit on an account's first login.
    FirstLogin,
    /// Daily consecutive-login reward credit.
    ConsecutiveLogin,
    /// Administrative absolute balance overwrite (checkpoint, no delta).
    ManuallyUpdated,
    /// Credit from an accepted donation.
    DonationGranted,
    /// Debit reversing a previously accepted donation.
    DonationRejected,
    /// Debit paying for a confirmed order.
    Consumed,
    /// Credit refunding a captured payment.
    Refunded,
}

impl BalanceEventType {
    /// Returns the wire/storage name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceEventType::FirstLogin => "FIRST_LOGIN",
            BalanceEventType::ConsecutiveLogin => "CONSECUTIVE_LOGIN",
            BalanceEventType::ManuallyUpdated => "MANUALLY_UPDATED",
            BalanceEventType::DonationGranted => "DONATION_GRANTED",
            BalanceEventType::DonationRejected => "DONATION_REJECTED",
            BalanceEventType::Consumed => "CONSUMED",
            BalanceEventType::Refunded => "REFUNDED",
        }
    }

    /// Parses a storage name back into an event type.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FIRST_LOGIN" => Some(BalanceEventType::FirstLogin),
            "CONSECUTIVE_LOGIN" => Some(BalanceEventType::ConsecutiveLogin),
            "MANUALLY_UPDATED" => Some(BalanceEventType::ManuallyUpdated),
            "DONATION_GRANTED" => Some(BalanceEventType::DonationGranted),
            "DONATION_REJECTED" => Some(BalanceEventType::DonationRejected),
            "CONSUMED" => Some(BalanceEventType::Consumed),
            "REFUNDED" => Some(BalanceEventType::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for BalanceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable, append-only record of one balance mutation.
///
/// Replaying all events for an account in `occurred_at` order and summing
/// `delta` must equal the account's current balance. Events with a `None`
/// delta are checkpoints (absolute overwrites) and are exempt from that sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub id: EventId,

    /// The account this event affects.
    pub account_id: AccountId,

    pub event_type: BalanceEventType,

    /// Signed amount applied to the balance. `None` for checkpoint events.
    pub delta: Option<Decimal>,

    /// Snapshot of the account balance immediately after this event.
    pub balance_after: Decimal,

    pub occurred_at: DateTime<Utc>,

    /// 1-based position of this event within its account's calendar month.
    /// Gapless per account+month, never reused.
    pub sequence_in_month: i32,
}

impl BalanceEvent {
    /// Human-readable receipt number: two-digit year, two-digit month,
    /// then the zero-padded monthly sequence (`YYMM####`).
    pub fn receipt_number(&self) -> String {
        format!(
            "{:02}{:02}{:04}",
            self.occurred_at.year() % 100,
            self.occurred_at.month(),
            self.sequence_in_month
        )
    }
}
