//! Settlement error types.

use common::{DonationId, OrderId, PaymentId};
use domain::{OrderError, PaymentError};
use ledger::LedgerError;
use thiserror::Error;

/// Errors that can occur during settlement operations.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The entity is not in a state that allows the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The actor is not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Payment not found.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// Donation not found.
    #[error("Donation not found: {0}")]
    DonationNotFound(DonationId),

    /// A donor code matched more than one account.
    #[error("Donor code '{0}' is ambiguous")]
    AmbiguousCode(String),

    /// Voucher service error.
    #[error("Voucher service error: {0}")]
    VoucherService(String),

    /// Stock service error.
    #[error("Stock service error: {0}")]
    StockService(String),

    /// Gift card service error.
    #[error("Gift card service error: {0}")]
    GiftCardService(String),

    /// Notifier error. Callers treat notification as fire-and-forget and
    /// log this instead of propagating it.
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// Order transition error.
    #[error("Order transition error: {0}")]
    Order(#[from] OrderError),

    /// Payment transition error.
    #[error("Payment transition error: {0}")]
    Payment(#[from] PaymentError),

    /// Ledger error.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for settlement results.
pub type Result<T> = std::result::Result<T, SettlementError>;
