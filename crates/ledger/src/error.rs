use rust_decimal::Decimal;
use thiserror::Error;

use common::AccountId;

/// Errors that can occur when interacting with the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A checked debit would drive the balance negative.
    /// Nothing is committed when this is returned.
    #[error(
        "Insufficient funds for account {account_id}: balance {balance}, requested debit {requested}"
    )]
    InsufficientFunds {
        account_id: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    /// The account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// A lock or version conflict occurred on the account row.
    /// Safe to retry with bounded backoff.
    #[error("Concurrency conflict on account {account_id}")]
    ConcurrencyConflict { account_id: AccountId },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
