//! In-memory repository implementations for testing and development.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{AccountId, DonationId, OrderId, PaymentId};
use domain::{Donation, Order, OrderEvent, OrderEventKind, OrderStatus, Payment};

use crate::error::{Result, SettlementError};
use crate::repos::{AccountDirectory, DonationRepository, OrderRepository, PaymentRepository};

#[derive(Debug, Default)]
struct OrderState {
    orders: HashMap<OrderId, Order>,
    events: Vec<OrderEvent>,
    // Channel expiry thresholds in minutes, keyed by channel id.
    channel_thresholds: HashMap<common::ChannelId, Option<i64>>,
}

/// In-memory order repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<OrderState>>,
    fail_on_append: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `append_order_event` fail, simulating a write outage.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Registers a channel's expiry threshold so `expirable` can honor it.
    pub async fn set_channel_threshold(
        &self,
        channel_id: common::ChannelId,
        minutes: Option<i64>,
    ) {
        self.state
            .write()
            .await
            .channel_thresholds
            .insert(channel_id, minutes);
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn insert(&self, order: &Order) -> Result<()> {
        self.state
            .write()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(())
    }

    async fn update_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.orders.get(&order.id) {
            Some(current) if current.status == expected => {
                state.orders.insert(order.id, order.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SettlementError::OrderNotFound(order.id)),
        }
    }

    async fn expirable(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut eligible: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.status.can_expire())
            .filter(|order| {
                let threshold = state
                    .channel_thresholds
                    .get(&order.channel_id)
                    .copied()
                    .flatten()
                    .filter(|m| *m > 0);
                match threshold {
                    Some(minutes) => order.age_minutes(now) >= minutes,
                    None => false,
                }
            })
            .cloned()
            .collect();

        eligible.sort_by_key(|order| order.created_at);
        eligible.truncate(limit.max(0) as usize);
        Ok(eligible)
    }

    async fn expire_with_events(&self, order_ids: &[OrderId], now: DateTime<Utc>) -> Result<u64> {
        // One write lock covers the status flips and their events, so the
        // pair is as atomic as the Postgres transaction backing it.
        let mut state = self.state.write().await;
        let mut changed = 0;
        for order_id in order_ids {
            if let Some(order) = state.orders.get(order_id)
                && order.status.can_expire()
            {
                let expired = order.expired(now)?;
                state.orders.insert(*order_id, expired);
                state
                    .events
                    .push(OrderEvent::new(*order_id, OrderEventKind::Expired));
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn append_order_event(&self, event: &OrderEvent) -> Result<()> {
        if self.fail_on_append.load(Ordering::SeqCst) {
            return Err(SettlementError::Database(sqlx::Error::PoolClosed));
        }
        self.state.write().await.events.push(event.clone());
        Ok(())
    }

    async fn events_for_order(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .iter()
            .filter(|event| event.order_id == order_id)
            .cloned()
            .collect())
    }
}

/// In-memory donation repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDonationRepository {
    donations: Arc<RwLock<HashMap<DonationId, Donation>>>,
}

impl InMemoryDonationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DonationRepository for InMemoryDonationRepository {
    async fn get_many(&self, donation_ids: &[DonationId]) -> Result<Vec<Donation>> {
        let donations = self.donations.read().await;
        Ok(donation_ids
            .iter()
            .filter_map(|id| donations.get(id).cloned())
            .collect())
    }

    async fn insert(&self, donation: &Donation) -> Result<()> {
        self.donations
            .write()
            .await
            .insert(donation.id, donation.clone());
        Ok(())
    }

    async fn update(&self, donation: &Donation) -> Result<()> {
        let mut donations = self.donations.write().await;
        if !donations.contains_key(&donation.id) {
            return Err(SettlementError::DonationNotFound(donation.id));
        }
        donations.insert(donation.id, donation.clone());
        Ok(())
    }
}

/// In-memory payment repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
    fail_on_insert: Arc<AtomicBool>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `insert` fail, simulating a write outage.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.fail_on_insert.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&payment_id).cloned())
    }

    async fn insert(&self, payment: &Payment) -> Result<()> {
        if self.fail_on_insert.load(Ordering::SeqCst) {
            return Err(SettlementError::Database(sqlx::Error::PoolClosed));
        }
        self.payments
            .write()
            .await
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn delete(&self, payment_id: PaymentId) -> Result<()> {
        self.payments.write().await.remove(&payment_id);
        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        if !payments.contains_key(&payment.id) {
            return Err(SettlementError::PaymentNotFound(payment.id));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn latest_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .filter(|payment| payment.order_id == order_id)
            .max_by_key(|payment| payment.created_at)
            .cloned())
    }
}

/// In-memory donor directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountDirectory {
    // A code may map to several accounts to model ambiguity.
    codes: Arc<RwLock<HashMap<String, Vec<AccountId>>>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a donor code for an account.
    pub async fn register(&self, code: &str, account_id: AccountId) {
        self.codes
            .write()
            .await
            .entry(code.to_string())
            .or_default()
            .push(account_id);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn find_account_by_code(&self, code: &str) -> Result<Option<AccountId>> {
        let codes = self.codes.read().await;
        match codes.get(code).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([account_id]) => Ok(Some(*account_id)),
            Some(_) => Err(SettlementError::AmbiguousCode(code.to_string())),
        }
    }
}
