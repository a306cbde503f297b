//! Payment records captured against account balances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::{OrderId, PaymentId};

use crate::order::ChargeStatus;

/// Name the balance gateway reports on payments it captures.
pub const BALANCE_GATEWAY: &str = "balance";

/// Errors raised by payment transitions.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(
        "Refund of {requested} exceeds refundable amount {refundable} on payment {payment_id}"
    )]
    InvalidAmount {
        payment_id: PaymentId,
        requested: Decimal,
        refundable: Decimal,
    },
}

/// A payment captured against an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub gateway: String,
    pub charge_status: ChargeStatus,
    pub total: Decimal,
    pub captured_amount: Decimal,
    pub refunded_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// A fully captured balance-gateway payment for a confirmed order.
    pub fn captured(order_id: OrderId, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            gateway: BALANCE_GATEWAY.to_string(),
            charge_status: ChargeStatus::FullyCharged,
            total: amount,
            captured_amount: amount,
            refunded_amount: Decimal::ZERO,
            created_at: now,
        }
    }

    /// Amount still refundable on this payment.
    pub fn refundable(&self) -> Decimal {
        self.captured_amount - self.refunded_amount
    }

    /// Copy of this payment with `amount` refunded.
    ///
    /// Rejects non-positive amounts and amounts beyond what remains
    /// refundable.
    pub fn refunded(&self, amount: Decimal) -> Result<Payment, PaymentError> {
        let refundable = self.refundable();
        if amount <= Decimal::ZERO || amount > refundable {
            return Err(PaymentError::InvalidAmount {
                payment_id: self.id,
                requested: amount,
                refundable,
            });
        }

        let refunded_amount = self.refunded_amount + amount;
        let charge_status = if refunded_amount >= self.captured_amount {
            ChargeStatus::FullyRefunded
        } else {
            ChargeStatus::PartiallyRefunded
        };

        Ok(Payment {
            charge_status,
            refunded_amount,
            ..self.clone()
        })
    }
}
