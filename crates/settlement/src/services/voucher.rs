//! Voucher service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::OrderId;

use crate::error::{Result, SettlementError};

/// Releases voucher bookkeeping held by orders that will never complete.
#[async_trait]
pub trait VoucherService: Send + Sync {
    /// Returns voucher usage counters consumed by the given orders.
    async fn release_usage(&self, order_ids: &[OrderId]) -> Result<()>;

    /// Removes per-customer voucher redemption records for the given orders.
    async fn remove_customer_records(&self, order_ids: &[OrderId]) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryVoucherState {
    released: Vec<OrderId>,
    removed: Vec<OrderId>,
    fail_on_release: bool,
}

/// In-memory voucher service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVoucherService {
    state: Arc<RwLock<InMemoryVoucherState>>,
}

impl InMemoryVoucherService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on the next release call.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    /// Number of orders whose voucher usage has been released.
    pub fn released_count(&self) -> usize {
        self.state.read().unwrap().released.len()
    }

    /// Number of orders whose customer records have been removed.
    pub fn removed_count(&self) -> usize {
        self.state.read().unwrap().removed.len()
    }
}

#[async_trait]
impl VoucherService for InMemoryVoucherService {
    async fn release_usage(&self, order_ids: &[OrderId]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_release {
            return Err(SettlementError::VoucherService(
                "Voucher backend unavailable".to_string(),
            ));
        }
        state.released.extend_from_slice(order_ids);
        Ok(())
    }

    async fn remove_customer_records(&self, order_ids: &[OrderId]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.removed.extend_from_slice(order_ids);
        Ok(())
    }
}
