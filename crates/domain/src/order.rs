//! Order model and its settlement state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use common::{AccountId, ChannelId, OrderId};

/// The state of an order in its settlement lifecycle.
///
/// State transitions:
/// ```text
/// Unconfirmed ──► Unfulfilled ──┬──► PartiallyFulfilled ──► Fulfilled
///      │               │        │             │
///      │               │        └─────────────┤
///      ├───────────────┴──► Canceled          │
///      └───────────────────► Expired ◄────────┘   (sweeper only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed but not yet confirmed against the buyer's balance.
    #[default]
    Unconfirmed,

    /// Confirmed and paid, awaiting fulfillment.
    Unfulfilled,

    /// Some but not all lines fulfilled.
    PartiallyFulfilled,

    /// All lines fulfilled (terminal for settlement purposes).
    Fulfilled,

    /// Canceled by the buyer or staff (terminal).
    Canceled,

    /// Reclaimed by the expiry sweeper (terminal).
    Expired,
}

impl OrderStatus {
    /// Returns true if the order can be confirmed in this state.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Unconfirmed)
    }

    /// Returns true if the order can be canceled in this state.
    pub fn is_cancelable(&self) -> bool {
        matches!(self, OrderStatus::Unconfirmed | OrderStatus::Unfulfilled)
    }

    /// Returns true if the sweeper may expire an order in this state.
    pub fn can_expire(&self) -> bool {
        matches!(
            self,
            OrderStatus::Unconfirmed | OrderStatus::Unfulfilled | OrderStatus::PartiallyFulfilled
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Canceled | OrderStatus::Expired
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Unconfirmed => "UNCONFIRMED",
            OrderStatus::Unfulfilled => "UNFULFILLED",
            OrderStatus::PartiallyFulfilled => "PARTIALLY_FULFILLED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    /// Parses a state name produced by `as_str`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNCONFIRMED" => Some(OrderStatus::Unconfirmed),
            "UNFULFILLED" => Some(OrderStatus::Unfulfilled),
            "PARTIALLY_FULFILLED" => Some(OrderStatus::PartiallyFulfilled),
            "FULFILLED" => Some(OrderStatus::Fulfilled),
            "CANCELED" => Some(OrderStatus::Canceled),
            "EXPIRED" => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Charge state of an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    /// No charge has been attempted.
    #[default]
    None,

    /// A charge exists but nothing has been captured.
    NotCharged,

    /// The full amount has been captured.
    FullyCharged,

    /// Part of the captured amount has been refunded.
    PartiallyRefunded,

    /// The whole captured amount has been refunded.
    FullyRefunded,
}

impl ChargeStatus {
    /// Returns true if no money has been captured for the order.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, ChargeStatus::None | ChargeStatus::NotCharged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::None => "NONE",
            ChargeStatus::NotCharged => "NOT_CHARGED",
            ChargeStatus::FullyCharged => "FULLY_CHARGED",
            ChargeStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
            ChargeStatus::FullyRefunded => "FULLY_REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(ChargeStatus::None),
            "NOT_CHARGED" => Some(ChargeStatus::NotCharged),
            "FULLY_CHARGED" => Some(ChargeStatus::FullyCharged),
            "PARTIALLY_REFUNDED" => Some(ChargeStatus::PartiallyRefunded),
            "FULLY_REFUNDED" => Some(ChargeStatus::FullyRefunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by order state transitions.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order {order_id} is {status}, transition to {requested} is not allowed")]
    InvalidTransition {
        order_id: OrderId,
        status: OrderStatus,
        requested: OrderStatus,
    },
}

/// The subset of an order relevant to settlement and expiry.
///
/// Transitions return a new value instead of mutating in place; the caller
/// persists the returned order in its own transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: AccountId,
    pub status: OrderStatus,
    pub total_net_amount: Decimal,
    pub charge_status: ChargeStatus,
    pub channel_id: ChannelId,
    pub created_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,

    /// Number of order lines; confirmation requires at least one.
    pub line_count: u32,
}

impl Order {
    /// Returns true if the order has at least one line.
    pub fn has_lines(&self) -> bool {
        self.line_count > 0
    }

    /// Confirmed-and-paid copy of this order: `Unconfirmed → Unfulfilled`
    /// with the full amount captured.
    pub fn confirmed(&self) -> Result<Order, OrderError> {
        if !self.status.can_confirm() {
            return Err(self.invalid_transition(OrderStatus::Unfulfilled));
        }
        Ok(Order {
            status: OrderStatus::Unfulfilled,
            charge_status: ChargeStatus::FullyCharged,
            ..self.clone()
        })
    }

    /// Fulfilled copy, used by the balance gateway's capture path.
    pub fn fulfilled(&self) -> Result<Order, OrderError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(OrderStatus::Fulfilled));
        }
        Ok(Order {
            status: OrderStatus::Fulfilled,
            charge_status: ChargeStatus::FullyCharged,
            ..self.clone()
        })
    }

    /// Canceled copy of this order.
    pub fn canceled(&self) -> Result<Order, OrderError> {
        if !self.status.is_cancelable() {
            return Err(self.invalid_transition(OrderStatus::Canceled));
        }
        Ok(Order {
            status: OrderStatus::Canceled,
            ..self.clone()
        })
    }

    /// Expired copy of this order with `expired_at` stamped.
    pub fn expired(&self, now: DateTime<Utc>) -> Result<Order, OrderError> {
        if !self.status.can_expire() {
            return Err(self.invalid_transition(OrderStatus::Expired));
        }
        Ok(Order {
            status: OrderStatus::Expired,
            expired_at: Some(now),
            ..self.clone()
        })
    }

    /// Age of the order at `now`, in whole minutes.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created_at).num_minutes()
    }

    fn invalid_transition(&self, requested: OrderStatus) -> OrderError {
        OrderError::InvalidTransition {
            order_id: self.id,
            status: self.status,
            requested,
        }
    }
}

/// Kind of entry in an order's audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    Confirmed,
    Canceled,
    Expired,
}

impl OrderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventKind::Confirmed => "CONFIRMED",
            OrderEventKind::Canceled => "CANCELED",
            OrderEventKind::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONFIRMED" => Some(OrderEventKind::Confirmed),
            "CANCELED" => Some(OrderEventKind::Canceled),
            "EXPIRED" => Some(OrderEventKind::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entry in an order's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: OrderId,
    pub kind: OrderEventKind,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Creates a new audit entry for an order.
    pub fn new(order_id: OrderId, kind: OrderEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            kind,
            occurred_at: Utc::now(),
        }
    }
}
