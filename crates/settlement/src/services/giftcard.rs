//! Gift card service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;

use crate::error::{Result, SettlementError};

/// Deactivates gift cards sold on an order when the order is canceled.
#[async_trait]
pub trait GiftCardService: Send + Sync {
    async fn deactivate_for_order(&self, order_id: OrderId) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryGiftCardState {
    deactivated: Vec<OrderId>,
    fail_on_deactivate: bool,
}

/// In-memory gift card service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGiftCardService {
    state: Arc<RwLock<InMemoryGiftCardState>>,
}

impl InMemoryGiftCardService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_deactivate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_deactivate = fail;
    }

    pub fn deactivated_count(&self) -> usize {
        self.state.read().unwrap().deactivated.len()
    }

    pub fn was_deactivated(&self, order_id: OrderId) -> bool {
        self.state.read().unwrap().deactivated.contains(&order_id)
    }
}

#[async_trait]
impl GiftCardService for InMemoryGiftCardService {
    async fn deactivate_for_order(&self, order_id: OrderId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_deactivate {
            return Err(SettlementError::GiftCardService(
                "Gift card backend unavailable".to_string(),
            ));
        }
        state.deactivated.push(order_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_deactivations() {
        let service = InMemoryGiftCardService::new();
        let order_id = OrderId::new();

        service.deactivate_for_order(order_id).await.unwrap();
        assert!(service.was_deactivated(order_id));
        assert_eq!(service.deactivated_count(), 1);
    }
}
