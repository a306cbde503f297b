//! Order confirmation, cancellation and refunds.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use common::{OrderId, PaymentId};
use domain::{Actor, Order, OrderEvent, OrderEventKind, OrderStatus, Payment};
use ledger::{BalanceEventType, LedgerStore};
use rust_decimal::Decimal;

use crate::error::{Result, SettlementError};
use crate::repos::{OrderRepository, PaymentRepository};
use crate::services::{GiftCardService, Notifier};

/// Settles orders against the buyer's account balance.
pub struct OrderSettlement {
    ledger: Arc<dyn LedgerStore>,
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    gift_cards: Arc<dyn GiftCardService>,
    notifier: Arc<dyn Notifier>,
}

impl OrderSettlement {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        gift_cards: Arc<dyn GiftCardService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            orders,
            payments,
            gift_cards,
            notifier,
        }
    }

    /// Confirms an order by debiting its total from the buyer's balance.
    ///
    /// The debit happens first; the status write is a compare-and-swap
    /// guarded on `Unconfirmed`. Losing the swap (a concurrent cancel won)
    /// refunds the debit, so exactly one of a racing confirm/cancel pair
    /// ever takes effect on the ledger. A write failure after the swap is
    /// compensated the same way: the payment, the debit and the status are
    /// all rolled back before the error surfaces.
    #[tracing::instrument(skip(self, actor))]
    pub async fn confirm_order(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        let order = self.load(order_id).await?;

        if !actor.is_staff && !actor.owns(order.user_id) {
            return Err(SettlementError::PermissionDenied(format!(
                "account {} may not confirm order {order_id}",
                actor.account_id
            )));
        }
        if !order.status.can_confirm() {
            return Err(SettlementError::InvalidState(format!(
                "order {order_id} is {}, only unconfirmed orders can be confirmed",
                order.status
            )));
        }
        if !order.has_lines() {
            return Err(SettlementError::InvalidState(format!(
                "order {order_id} has no lines"
            )));
        }

        let total = order.total_net_amount;
        self.ledger
            .apply_debit_if_sufficient(order.user_id, -total, BalanceEventType::Consumed)
            .await?;

        let confirmed = order.confirmed()?;
        if !self
            .orders
            .update_if_status(&confirmed, OrderStatus::Unconfirmed)
            .await?
        {
            // Lost the race against a cancel: give the money back.
            self.ledger
                .apply_delta(order.user_id, total, BalanceEventType::Refunded)
                .await?;
            metrics::counter!("orders_confirm_races_lost_total").increment(1);
            return Err(SettlementError::InvalidState(format!(
                "order {order_id} left UNCONFIRMED during confirmation"
            )));
        }

        let payment = Payment::captured(order_id, total, Utc::now());
        if let Err(e) = self.record_confirmation(&payment).await {
            // The order already reads confirmed; undo everything so a failed
            // confirmation leaves no trace.
            self.payments.delete(payment.id).await?;
            self.ledger
                .apply_delta(order.user_id, total, BalanceEventType::Refunded)
                .await?;
            if !self.orders.update_if_status(&order, confirmed.status).await? {
                tracing::warn!(%order_id, "order changed state during confirmation rollback");
            }
            metrics::counter!("orders_confirm_rollbacks_total").increment(1);
            return Err(e);
        }

        self.notify(
            "order_confirmed",
            json!({ "order_id": order_id, "total": total }),
        )
        .await;

        metrics::counter!("orders_confirmed_total").increment(1);
        tracing::info!(%order_id, %total, "order confirmed");
        Ok(confirmed)
    }

    /// Cancels an order that has not been fulfilled yet.
    ///
    /// Staff can cancel anything cancelable; the owner only while the order
    /// is still unconfirmed. No ledger effect: an unconfirmed order was never
    /// debited, and a confirmed one is refunded explicitly via
    /// `refund_payment`.
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel_order(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        let order = self.load(order_id).await?;

        if !order.status.is_cancelable() {
            return Err(SettlementError::InvalidState(format!(
                "order {order_id} is {}, not cancelable",
                order.status
            )));
        }

        let owner_may_cancel = actor.owns(order.user_id) && order.status == OrderStatus::Unconfirmed;
        if !actor.is_staff && !owner_may_cancel {
            return Err(SettlementError::PermissionDenied(format!(
                "account {} may not cancel order {order_id}",
                actor.account_id
            )));
        }

        let canceled = order.canceled()?;
        if !self.orders.update_if_status(&canceled, order.status).await? {
            return Err(SettlementError::InvalidState(format!(
                "order {order_id} changed state during cancellation"
            )));
        }

        self.gift_cards.deactivate_for_order(order_id).await?;
        self.orders
            .append_order_event(&OrderEvent::new(order_id, OrderEventKind::Canceled))
            .await?;

        self.notify("order_canceled", json!({ "order_id": order_id }))
            .await;

        metrics::counter!("orders_canceled_total").increment(1);
        tracing::info!(%order_id, "order canceled");
        Ok(canceled)
    }

    /// Refunds part or all of a captured payment back to the order's owner.
    ///
    /// The ledger credit is committed before the payment is marked refunded,
    /// mirroring the ordering used everywhere else.
    #[tracing::instrument(skip(self))]
    pub async fn refund_payment(&self, payment_id: PaymentId, amount: Decimal) -> Result<Payment> {
        let payment = self
            .payments
            .get(payment_id)
            .await?
            .ok_or(SettlementError::PaymentNotFound(payment_id))?;

        let refunded = payment.refunded(amount)?;
        let order = self.load(payment.order_id).await?;

        self.ledger
            .apply_delta(order.user_id, amount, BalanceEventType::Refunded)
            .await?;
        self.payments.update(&refunded).await?;

        metrics::counter!("payments_refunded_total").increment(1);
        tracing::info!(%payment_id, %amount, "payment refunded");
        Ok(refunded)
    }

    /// Records the captured payment and the audit event for a confirmation.
    /// The caller compensates when either write fails.
    async fn record_confirmation(&self, payment: &Payment) -> Result<()> {
        self.payments.insert(payment).await?;
        self.orders
            .append_order_event(&OrderEvent::new(payment.order_id, OrderEventKind::Confirmed))
            .await
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))
    }

    async fn notify(&self, event: &str, payload: serde_json::Value) {
        if let Err(e) = self.notifier.notify(event, payload).await {
            tracing::warn!(event, error = %e, "notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AccountId, ChannelId};
    use domain::ChargeStatus;
    use ledger::{Account, InMemoryLedgerStore, LedgerError};
    use rust_decimal_macros::dec;

    use crate::repos::{InMemoryOrderRepository, InMemoryPaymentRepository};
    use crate::services::{InMemoryGiftCardService, InMemoryNotifier};

    struct Fixture {
        settlement: Arc<OrderSettlement>,
        ledger: Arc<InMemoryLedgerStore>,
        orders: Arc<InMemoryOrderRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        gift_cards: Arc<InMemoryGiftCardService>,
        notifier: Arc<InMemoryNotifier>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::default());
        let orders = Arc::new(InMemoryOrderRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let gift_cards = Arc::new(InMemoryGiftCardService::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let settlement = Arc::new(OrderSettlement::new(
            ledger.clone(),
            orders.clone(),
            payments.clone(),
            gift_cards.clone(),
            notifier.clone(),
        ));
        Fixture {
            settlement,
            ledger,
            orders,
            payments,
            gift_cards,
            notifier,
        }
    }

    async fn seed_buyer(f: &Fixture, balance: Decimal) -> AccountId {
        let account_id = AccountId::new();
        f.ledger
            .create_account(Account::with_balance(account_id, balance))
            .await
            .unwrap();
        account_id
    }

    async fn seed_order(f: &Fixture, user_id: AccountId, total: Decimal) -> Order {
        let order = Order {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Unconfirmed,
            total_net_amount: total,
            charge_status: ChargeStatus::NotCharged,
            channel_id: ChannelId::new(),
            created_at: Utc::now(),
            expired_at: None,
            line_count: 2,
        };
        f.orders.insert(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn confirm_debits_balance_and_captures_payment() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(75.500)).await;

        let confirmed = f
            .settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await
            .unwrap();

        assert_eq!(confirmed.status, OrderStatus::Unfulfilled);
        assert_eq!(confirmed.charge_status, ChargeStatus::FullyCharged);

        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(24.500));

        let events = f.ledger.events_for_account(buyer).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, BalanceEventType::Consumed);
        assert_eq!(events[0].delta, Some(dec!(-75.500)));

        let payment = f
            .payments
            .latest_for_order(order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.charge_status, ChargeStatus::FullyCharged);
        assert_eq!(payment.captured_amount, dec!(75.500));

        assert_eq!(f.notifier.delivered_for("order_confirmed"), 1);
        let trail = f.orders.events_for_order(order.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].kind, OrderEventKind::Confirmed);
    }

    #[tokio::test]
    async fn confirm_rejects_insufficient_funds_untouched() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(50.000)).await;
        let order = seed_order(&f, buyer, dec!(75.500)).await;

        let result = f
            .settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await;
        assert!(matches!(
            result,
            Err(SettlementError::Ledger(LedgerError::InsufficientFunds { .. }))
        ));

        // Order, balance and event log are all untouched.
        let stored = f.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Unconfirmed);
        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(50.000));
        assert!(f.ledger.events_for_account(buyer).await.unwrap().is_empty());
        assert!(
            f.payments
                .latest_for_order(order.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn confirm_rejects_empty_order() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let mut order = seed_order(&f, buyer, dec!(10.000)).await;
        order.line_count = 0;
        f.orders.insert(&order).await.unwrap();

        let result = f
            .settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await;
        assert!(matches!(result, Err(SettlementError::InvalidState(_))));
    }

    #[tokio::test]
    async fn confirm_rejects_foreign_customer() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(10.000)).await;

        let stranger = Actor::customer(AccountId::new());
        let result = f.settlement.confirm_order(order.id, &stranger).await;
        assert!(matches!(result, Err(SettlementError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn concurrent_confirm_and_cancel_have_one_winner() {
        // Run the race many times; whatever the interleaving, exactly one
        // side wins and the ledger nets out to either -total or zero,
        // matching the stored order status.
        for _ in 0..20 {
            let f = fixture();
            let buyer = seed_buyer(&f, dec!(100.000)).await;
            let order = seed_order(&f, buyer, dec!(30.000)).await;

            let confirm = {
                let settlement = f.settlement.clone();
                let actor = Actor::customer(buyer);
                let order_id = order.id;
                tokio::spawn(async move { settlement.confirm_order(order_id, &actor).await })
            };
            let cancel = {
                let settlement = f.settlement.clone();
                let actor = Actor::customer(buyer);
                let order_id = order.id;
                tokio::spawn(async move { settlement.cancel_order(order_id, &actor).await })
            };

            let confirm_won = confirm.await.unwrap().is_ok();
            let cancel_won = cancel.await.unwrap().is_ok();
            assert!(
                confirm_won ^ cancel_won,
                "exactly one of confirm/cancel must win"
            );

            let stored = f.orders.get(order.id).await.unwrap().unwrap();
            let account = f.ledger.get_account(buyer).await.unwrap();
            if confirm_won {
                assert_eq!(stored.status, OrderStatus::Unfulfilled);
                assert_eq!(account.balance, dec!(70.000));
            } else {
                assert_eq!(stored.status, OrderStatus::Canceled);
                // Either never debited, or debited and compensated.
                assert_eq!(account.balance, dec!(100.000));
            }
        }
    }

    #[tokio::test]
    async fn failed_payment_write_rolls_back_confirmation() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(75.500)).await;
        f.payments.set_fail_on_insert(true);

        let result = f
            .settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await;
        assert!(matches!(result, Err(SettlementError::Database(_))));

        // The order reads unconfirmed again and the buyer got their money
        // back; no payment, audit event or notification remains.
        let stored = f.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Unconfirmed);
        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(100.000));
        let events = f.ledger.events_for_account(buyer).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, BalanceEventType::Refunded);
        assert!(
            f.payments
                .latest_for_order(order.id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(f.orders.events_for_order(order.id).await.unwrap().is_empty());
        assert_eq!(f.notifier.delivered_count(), 0);
    }

    #[tokio::test]
    async fn failed_event_write_rolls_back_payment_too() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(75.500)).await;
        f.orders.set_fail_on_append(true);

        let result = f
            .settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await;
        assert!(matches!(result, Err(SettlementError::Database(_))));

        let stored = f.orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Unconfirmed);
        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(100.000));
        // The already-written payment was deleted with the rollback.
        assert!(
            f.payments
                .latest_for_order(order.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn owner_can_cancel_only_unconfirmed() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(10.000)).await;

        f.settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await
            .unwrap();

        // Now UNFULFILLED: the owner may no longer cancel.
        let result = f
            .settlement
            .cancel_order(order.id, &Actor::customer(buyer))
            .await;
        assert!(matches!(result, Err(SettlementError::PermissionDenied(_))));

        // Staff still can.
        let canceled = f
            .settlement
            .cancel_order(order.id, &Actor::staff(AccountId::new()))
            .await
            .unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert!(f.gift_cards.was_deactivated(order.id));
        assert_eq!(f.notifier.delivered_for("order_canceled"), 1);
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_order() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(10.000)).await;

        let staff = Actor::staff(AccountId::new());
        f.settlement.cancel_order(order.id, &staff).await.unwrap();

        let result = f.settlement.cancel_order(order.id, &staff).await;
        assert!(matches!(result, Err(SettlementError::InvalidState(_))));
    }

    #[tokio::test]
    async fn cancel_has_no_ledger_effect() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(10.000)).await;

        f.settlement
            .cancel_order(order.id, &Actor::customer(buyer))
            .await
            .unwrap();

        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(100.000));
        assert!(f.ledger.events_for_account(buyer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refund_credits_owner_and_marks_payment() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(75.500)).await;
        f.settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await
            .unwrap();
        let payment = f
            .payments
            .latest_for_order(order.id)
            .await
            .unwrap()
            .unwrap();

        let refunded = f
            .settlement
            .refund_payment(payment.id, dec!(25.500))
            .await
            .unwrap();
        assert_eq!(refunded.charge_status, ChargeStatus::PartiallyRefunded);

        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(50.000));
        let events = f.ledger.events_for_account(buyer).await.unwrap();
        assert_eq!(events.last().unwrap().event_type, BalanceEventType::Refunded);
    }

    #[tokio::test]
    async fn refund_rejects_overdraw_without_ledger_effect() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(40.000)).await;
        f.settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await
            .unwrap();
        let payment = f
            .payments
            .latest_for_order(order.id)
            .await
            .unwrap()
            .unwrap();

        let result = f.settlement.refund_payment(payment.id, dec!(50.000)).await;
        assert!(matches!(result, Err(SettlementError::Payment(_))));

        let account = f.ledger.get_account(buyer).await.unwrap();
        assert_eq!(account.balance, dec!(60.000));
    }

    #[tokio::test]
    async fn refund_rejects_unknown_payment() {
        let f = fixture();
        let result = f
            .settlement
            .refund_payment(PaymentId::new(), dec!(1.000))
            .await;
        assert!(matches!(result, Err(SettlementError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn failed_notification_does_not_fail_confirmation() {
        let f = fixture();
        let buyer = seed_buyer(&f, dec!(100.000)).await;
        let order = seed_order(&f, buyer, dec!(10.000)).await;
        f.notifier.set_fail_on_notify(true);

        let confirmed = f
            .settlement
            .confirm_order(order.id, &Actor::customer(buyer))
            .await
            .unwrap();
        assert_eq!(confirmed.status, OrderStatus::Unfulfilled);
        assert_eq!(f.notifier.delivered_count(), 0);
    }
}
