//! Stock service trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;
use domain::Order;

use crate::error::{Result, SettlementError};

/// Returns inventory held by orders that will never complete.
#[async_trait]
pub trait StockService: Send + Sync {
    /// Returns allocated stock for a batch of never-started orders.
    async fn deallocate_for_orders(&self, order_ids: &[OrderId]) -> Result<()>;

    /// Removes stock reservations held by one in-flight order.
    async fn remove_reservations(&self, order_id: OrderId) -> Result<()>;

    /// Creates compensating fulfillments that return already-shipped
    /// quantities of a partially fulfilled order.
    async fn create_compensating_fulfillments(&self, order: &Order) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryStockState {
    deallocated: Vec<OrderId>,
    reservations_removed: Vec<OrderId>,
    compensated: Vec<OrderId>,
    fail_for: HashSet<OrderId>,
    fail_on_deallocate: bool,
}

/// In-memory stock service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockService {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures reservation removal to fail for one specific order.
    pub fn set_fail_for_order(&self, order_id: OrderId) {
        self.state.write().unwrap().fail_for.insert(order_id);
    }

    /// Configures the service to fail batch deallocation.
    pub fn set_fail_on_deallocate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_deallocate = fail;
    }

    pub fn deallocated_count(&self) -> usize {
        self.state.read().unwrap().deallocated.len()
    }

    pub fn reservations_removed_count(&self) -> usize {
        self.state.read().unwrap().reservations_removed.len()
    }

    pub fn compensated_count(&self) -> usize {
        self.state.read().unwrap().compensated.len()
    }
}

#[async_trait]
impl StockService for InMemoryStockService {
    async fn deallocate_for_orders(&self, order_ids: &[OrderId]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_deallocate {
            return Err(SettlementError::StockService(
                "Warehouse backend unavailable".to_string(),
            ));
        }
        state.deallocated.extend_from_slice(order_ids);
        Ok(())
    }

    async fn remove_reservations(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_for.contains(&order_id) {
            return Err(SettlementError::StockService(format!(
                "Reservation lookup failed for order {order_id}"
            )));
        }
        state.reservations_removed.push(order_id);
        Ok(())
    }

    async fn create_compensating_fulfillments(&self, order: &Order) -> Result<()> {
        self.state.write().unwrap().compensated.push(order.id);
        Ok(())
    }
}
