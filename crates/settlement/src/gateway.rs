//! Balance-backed payment gateway adapter.
//!
//! Presents the ledger with the request/response shape payment gateways use:
//! a failed capture is a business outcome carried in the result, not an
//! error. Only infrastructure failures surface as `Err`.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use common::{AccountId, OrderId};
use domain::Payment;
use ledger::{BalanceEventType, LedgerError, LedgerStore};

use crate::error::{Result, SettlementError};
use crate::repos::{OrderRepository, PaymentRepository};

/// What a gateway transaction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Funds were captured.
    Capture,

    /// The attempt was voided without moving money.
    Void,
}

/// Gateway-shaped response for one payment attempt.
#[derive(Debug, Clone)]
pub struct GatewayResult {
    pub success: bool,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_id: String,
    pub error: Option<String>,
}

/// Processes payments by debiting account balances.
pub struct BalanceGateway {
    ledger: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl BalanceGateway {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            ledger,
            orders,
            payments,
        }
    }

    /// Captures `amount` from the account for the given order.
    ///
    /// Insufficient funds yield a failed `Void` result rather than an error;
    /// on success the order is marked fulfilled and fully charged, and a
    /// captured payment is recorded.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment(
        &self,
        account_id: AccountId,
        order_id: OrderId,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayResult> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        match self
            .ledger
            .apply_debit_if_sufficient(account_id, -amount, BalanceEventType::Consumed)
            .await
        {
            Ok(_) => {}
            Err(LedgerError::InsufficientFunds { .. }) => {
                metrics::counter!("gateway_captures_declined_total").increment(1);
                tracing::info!(%account_id, %order_id, %amount, "capture declined");
                return Ok(self.voided(amount, currency, "Insufficient funds"));
            }
            Err(e) => return Err(e.into()),
        }

        let fulfilled = order.fulfilled()?;
        if !self.orders.update_if_status(&fulfilled, order.status).await? {
            // Order changed under us after the debit: give the money back
            // and report a void instead of guessing.
            self.ledger
                .apply_delta(account_id, amount, BalanceEventType::Refunded)
                .await?;
            return Ok(self.voided(amount, currency, "Order state changed"));
        }

        if let Err(e) = self
            .payments
            .insert(&Payment::captured(order_id, amount, Utc::now()))
            .await
        {
            // Undo the capture so a half-recorded payment never stands.
            self.ledger
                .apply_delta(account_id, amount, BalanceEventType::Refunded)
                .await?;
            if !self.orders.update_if_status(&order, fulfilled.status).await? {
                tracing::warn!(%order_id, "order changed state during capture rollback");
            }
            return Err(e);
        }

        metrics::counter!("gateway_captures_total").increment(1);
        Ok(GatewayResult {
            success: true,
            kind: TransactionKind::Capture,
            amount,
            currency: currency.to_string(),
            transaction_id: Uuid::new_v4().to_string(),
            error: None,
        })
    }

    fn voided(&self, amount: Decimal, currency: &str, reason: &str) -> GatewayResult {
        GatewayResult {
            success: false,
            kind: TransactionKind::Void,
            amount,
            currency: currency.to_string(),
            transaction_id: Uuid::new_v4().to_string(),
            error: Some(reason.to_string()),
        }
    }
}
