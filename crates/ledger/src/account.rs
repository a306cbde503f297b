use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::AccountId;

/// A user's balance account.
///
/// Owned by the identity subsystem; the ledger only mutates `balance`,
/// `continuous_login_streak` and `last_login_at`, and only under its own
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Current spendable balance. Every mutation goes through the ledger
    /// store and is mirrored by exactly one balance event.
    pub balance: Decimal,

    /// Number of consecutive days this account has logged in.
    pub continuous_login_streak: i32,

    /// Timestamp of the most recent login, if any.
    pub last_login_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Creates a fresh account with a zero balance and no login history.
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balance: Decimal::ZERO,
            continuous_login_streak: 0,
            last_login_at: None,
        }
    }

    /// Creates an account seeded with an opening balance.
    pub fn with_balance(id: AccountId, balance: Decimal) -> Self {
        Self {
            id,
            balance,
            continuous_login_streak: 0,
            last_login_at: None,
        }
    }
}
