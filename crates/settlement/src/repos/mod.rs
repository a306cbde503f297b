//! Repository traits for orders, donations, payments and donor lookup.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use common::{AccountId, DonationId, OrderId, PaymentId};
use domain::{Donation, Order, OrderEvent, OrderStatus, Payment};

use crate::error::Result;

pub use memory::{
    InMemoryAccountDirectory, InMemoryDonationRepository, InMemoryOrderRepository,
    InMemoryPaymentRepository,
};
pub use postgres::{
    PostgresAccountDirectory, PostgresDonationRepository, PostgresOrderRepository,
    PostgresPaymentRepository,
};

/// Persistence for orders and their audit trail.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    async fn insert(&self, order: &Order) -> Result<()>;

    /// Writes `order` only if the stored status still equals `expected`.
    ///
    /// Returns `false` when the guard fails; this is the compare-and-swap
    /// that resolves concurrent confirm/cancel races to a single winner.
    async fn update_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool>;

    /// The expiry work queue: non-terminal orders older than their channel's
    /// expiry threshold, oldest first, at most `limit` rows. Channels with no
    /// positive threshold contribute nothing.
    async fn expirable(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>>;

    /// Marks the given orders `Expired` with `expired_at = now` and appends
    /// an `Expired` audit event for each, as one atomic step: either the
    /// status change and its events all land or none do. Orders that already
    /// reached a terminal state are left untouched and get no event.
    async fn expire_with_events(&self, order_ids: &[OrderId], now: DateTime<Utc>) -> Result<u64>;

    async fn append_order_event(&self, event: &OrderEvent) -> Result<()>;

    async fn events_for_order(&self, order_id: OrderId) -> Result<Vec<OrderEvent>>;
}

/// Persistence for donations.
#[async_trait]
pub trait DonationRepository: Send + Sync {
    /// Fetches the donations with the given ids; missing ids are simply
    /// absent from the result.
    async fn get_many(&self, donation_ids: &[DonationId]) -> Result<Vec<Donation>>;

    async fn insert(&self, donation: &Donation) -> Result<()>;

    async fn update(&self, donation: &Donation) -> Result<()>;
}

/// Persistence for payments.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>>;

    async fn insert(&self, payment: &Payment) -> Result<()>;

    async fn update(&self, payment: &Payment) -> Result<()>;

    /// Removes a payment, the compensating step for `insert`. Deleting a
    /// payment that does not exist is a no-op.
    async fn delete(&self, payment_id: PaymentId) -> Result<()>;

    /// Most recently created payment for the order, if any.
    async fn latest_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;
}

/// Resolves external donor codes to accounts.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Looks up the account a donor code belongs to.
    ///
    /// `Ok(None)` on a miss; `Err(AmbiguousCode)` when more than one account
    /// claims the code.
    async fn find_account_by_code(&self, code: &str) -> Result<Option<AccountId>>;
}
