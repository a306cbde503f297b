//! PostgreSQL repository implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{AccountId, ChannelId, DonationId, OrderId, PaymentId};
use domain::{
    ChargeStatus, Donation, DonationStatus, Order, OrderEvent, OrderEventKind, OrderStatus,
    Payment,
};

use crate::error::{Result, SettlementError};
use crate::repos::{AccountDirectory, DonationRepository, OrderRepository, PaymentRepository};

fn parse_enum<T>(column: &str, raw: &str, parsed: Option<T>) -> Result<T> {
    parsed.ok_or_else(|| {
        SettlementError::Database(sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: format!("unknown {column} value '{raw}'").into(),
        })
    })
}

/// PostgreSQL-backed order repository.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_raw: String = row.try_get("status")?;
        let charge_raw: String = row.try_get("charge_status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: AccountId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            status: parse_enum("status", &status_raw, OrderStatus::parse(&status_raw))?,
            total_net_amount: row.try_get("total_net_amount")?,
            charge_status: parse_enum(
                "charge_status",
                &charge_raw,
                ChargeStatus::parse(&charge_raw),
            )?,
            channel_id: ChannelId::from_uuid(row.try_get::<Uuid, _>("channel_id")?),
            created_at: row.try_get("created_at")?,
            expired_at: row.try_get("expired_at")?,
            line_count: row.try_get::<i32, _>("line_count")? as u32,
        })
    }

    fn row_to_event(row: PgRow) -> Result<OrderEvent> {
        let kind_raw: String = row.try_get("kind")?;
        Ok(OrderEvent {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            kind: parse_enum("kind", &kind_raw, OrderEventKind::parse(&kind_raw))?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

const ORDER_COLUMNS: &str = "id, user_id, status, total_net_amount, charge_status, channel_id, \
                             created_at, expired_at, line_count";

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, status, total_net_amount, charge_status, channel_id,
                 created_at, expired_at, line_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_net_amount)
        .bind(order.charge_status.as_str())
        .bind(order.channel_id.as_uuid())
        .bind(order.created_at)
        .bind(order.expired_at)
        .bind(order.line_count as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, charge_status = $3, expired_at = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.charge_status.as_str())
        .bind(order.expired_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expirable(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.user_id, o.status, o.total_net_amount, o.charge_status,
                   o.channel_id, o.created_at, o.expired_at, o.line_count
            FROM orders o
            JOIN channels c ON c.id = o.channel_id
            WHERE o.status IN ('UNCONFIRMED', 'UNFULFILLED', 'PARTIALLY_FULFILLED')
              AND c.expire_orders_after_minutes IS NOT NULL
              AND c.expire_orders_after_minutes > 0
              AND o.created_at + make_interval(mins => c.expire_orders_after_minutes::int) <= $1
            ORDER BY o.created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn expire_with_events(&self, order_ids: &[OrderId], now: DateTime<Utc>) -> Result<u64> {
        let ids: Vec<Uuid> = order_ids.iter().map(|id| id.as_uuid()).collect();
        let mut tx = self.pool.begin().await?;

        // Flip the statuses first and write events only for the rows that
        // actually changed, so orders canceled since the queue was read get
        // neither an EXPIRED status nor a stray event.
        let expired: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = 'EXPIRED', expired_at = $2
            WHERE id = ANY($1)
              AND status IN ('UNCONFIRMED', 'UNFULFILLED', 'PARTIALLY_FULFILLED')
            RETURNING id
            "#,
        )
        .bind(&ids)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        for order_id in &expired {
            sqlx::query(
                r#"
                INSERT INTO order_events (id, order_id, kind, occurred_at)
                VALUES ($1, $2, 'EXPIRED', $3)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(expired.len() as u64)
    }

    async fn append_order_event(&self, event: &OrderEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_events (id, order_id, kind, occurred_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.id)
        .bind(event.order_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events_for_order(&self, order_id: OrderId) -> Result<Vec<OrderEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, kind, occurred_at
            FROM order_events
            WHERE order_id = $1
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}

/// PostgreSQL-backed donation repository.
#[derive(Clone)]
pub struct PostgresDonationRepository {
    pool: PgPool,
}

impl PostgresDonationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_donation(row: PgRow) -> Result<Donation> {
        let status_raw: String = row.try_get("status")?;
        Ok(Donation {
            id: DonationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            number: row.try_get("number")?,
            donator_code: row.try_get("donator_code")?,
            barcode: row.try_get("barcode")?,
            price_amount: row.try_get("price_amount")?,
            quantity: row.try_get("quantity")?,
            status: parse_enum("status", &status_raw, DonationStatus::parse(&status_raw))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl DonationRepository for PostgresDonationRepository {
    async fn get_many(&self, donation_ids: &[DonationId]) -> Result<Vec<Donation>> {
        let ids: Vec<Uuid> = donation_ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, number, donator_code, barcode, price_amount, quantity,
                   status, created_at, updated_at
            FROM donations
            WHERE id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_donation).collect()
    }

    async fn insert(&self, donation: &Donation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO donations
                (id, number, donator_code, barcode, price_amount, quantity,
                 status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(donation.id.as_uuid())
        .bind(donation.number)
        .bind(&donation.donator_code)
        .bind(&donation.barcode)
        .bind(donation.price_amount)
        .bind(donation.quantity)
        .bind(donation.status.as_str())
        .bind(donation.created_at)
        .bind(donation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, donation: &Donation) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE donations
            SET status = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(donation.id.as_uuid())
        .bind(donation.status.as_str())
        .bind(donation.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SettlementError::DonationNotFound(donation.id));
        }
        Ok(())
    }
}

/// PostgreSQL-backed payment repository.
#[derive(Clone)]
pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let charge_raw: String = row.try_get("charge_status")?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            gateway: row.try_get("gateway")?,
            charge_status: parse_enum(
                "charge_status",
                &charge_raw,
                ChargeStatus::parse(&charge_raw),
            )?,
            total: row.try_get("total")?,
            captured_amount: row.try_get("captured_amount")?,
            refunded_amount: row.try_get("refunded_amount")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

const PAYMENT_COLUMNS: &str =
    "id, order_id, gateway, charge_status, total, captured_amount, refunded_amount, created_at";

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn get(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, gateway, charge_status, total, captured_amount,
                 refunded_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(&payment.gateway)
        .bind(payment.charge_status.as_str())
        .bind(payment.total)
        .bind(payment.captured_amount)
        .bind(payment.refunded_amount)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET charge_status = $2, captured_amount = $3, refunded_amount = $4
            WHERE id = $1
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.charge_status.as_str())
        .bind(payment.captured_amount)
        .bind(payment.refunded_amount)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SettlementError::PaymentNotFound(payment.id));
        }
        Ok(())
    }

    async fn delete(&self, payment_id: PaymentId) -> Result<()> {
        sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(payment_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }
}

/// PostgreSQL-backed donor directory over the `account_codes` table.
#[derive(Clone)]
pub struct PostgresAccountDirectory {
    pool: PgPool,
}

impl PostgresAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    async fn find_account_by_code(&self, code: &str) -> Result<Option<AccountId>> {
        let rows: Vec<Uuid> =
            sqlx::query_scalar("SELECT account_id FROM account_codes WHERE code = $1 LIMIT 2")
                .bind(code)
                .fetch_all(&self.pool)
                .await?;

        match rows.as_slice() {
            [] => Ok(None),
            [account_id] => Ok(Some(AccountId::from_uuid(*account_id))),
            _ => Err(SettlementError::AmbiguousCode(code.to_string())),
        }
    }
}
