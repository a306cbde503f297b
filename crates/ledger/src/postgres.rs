use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use common::AccountId;

use crate::{
    Account, BalanceEvent, BalanceEventType, EventId, LedgerConfig, LedgerError, Result,
    store::LedgerStore,
};

/// PostgreSQL-backed ledger store implementation.
///
/// Concurrent mutations to one account are serialized with a row-level
/// `SELECT ... FOR UPDATE`; the monthly sequence number is computed under
/// that same lock, so it can neither skip nor repeat.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    config: LedgerConfig,
}

impl PostgresLedgerStore {
    /// Creates a new PostgreSQL ledger store.
    pub fn new(pool: PgPool, config: LedgerConfig) -> Self {
        Self { pool, config }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_account(row: PgRow) -> Result<Account> {
        Ok(Account {
            id: AccountId::from_uuid(row.try_get::<Uuid, _>("id")?),
            balance: row.try_get("balance")?,
            continuous_login_streak: row.try_get("continuous_login_streak")?,
            last_login_at: row.try_get("last_login_at")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<BalanceEvent> {
        let type_name: String = row.try_get("event_type")?;
        let event_type: BalanceEventType =
            serde_json::from_value(serde_json::Value::String(type_name))?;

        Ok(BalanceEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id")?),
            event_type,
            delta: row.try_get("delta")?,
            balance_after: row.try_get("balance_after")?,
            occurred_at: row.try_get("occurred_at")?,
            sequence_in_month: row.try_get("sequence_in_month")?,
        })
    }

    /// Locks the account row and returns its current balance.
    async fn lock_balance(
        tx: &mut Transaction<'_, Postgres>,
        account_id: AccountId,
    ) -> Result<Decimal> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            Some(row) => Ok(row.try_get("balance")?),
            None => Err(LedgerError::AccountNotFound(account_id)),
        }
    }

    /// Writes the new balance and appends the event inside the caller's
    /// transaction. The account row lock is already held.
    async fn write_balance_and_event(
        account_id: AccountId,
        tx: &mut Transaction<'_, Postgres>,
        delta: Option<Decimal>,
        new_balance: Decimal,
        event_type: BalanceEventType,
    ) -> Result<BalanceEvent> {
        sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(account_id.as_uuid())
            .bind(new_balance)
            .execute(&mut **tx)
            .await?;

        let now = Utc::now();
        let sequence: i32 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(sequence_in_month), 0) + 1
            FROM balance_events
            WHERE account_id = $1
              AND date_trunc('month', occurred_at) = date_trunc('month', $2::timestamptz)
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        let event = BalanceEvent {
            id: EventId::new(),
            account_id,
            event_type,
            delta,
            balance_after: new_balance,
            occurred_at: now,
            sequence_in_month: sequence,
        };

        sqlx::query(
            r#"
            INSERT INTO balance_events
                (id, account_id, event_type, delta, balance_after, occurred_at, sequence_in_month)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.account_id.as_uuid())
        .bind(event.event_type.as_str())
        .bind(event.delta)
        .bind(event.balance_after)
        .bind(event.occurred_at)
        .bind(event.sequence_in_month)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            // The unique (account, month, sequence) index can only trip if a
            // writer bypassed the row lock; surface it as a conflict.
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_account_month_sequence")
            {
                return LedgerError::ConcurrencyConflict { account_id };
            }
            LedgerError::Database(e)
        })?;

        Ok(event)
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn create_account(&self, account: Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, continuous_login_streak, last_login_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.balance)
        .bind(account.continuous_login_streak)
        .bind(account.last_login_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Account> {
        let row = sqlx::query(
            r#"
            SELECT id, balance, continuous_login_streak, last_login_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_account(row),
            None => Err(LedgerError::AccountNotFound(account_id)),
        }
    }

    async fn apply_delta(
        &self,
        account_id: AccountId,
        delta: Decimal,
        event_type: BalanceEventType,
    ) -> Result<(Decimal, BalanceEvent)> {
        let mut tx = self.pool.begin().await?;

        let balance = Self::lock_balance(&mut tx, account_id).await?;
        let delta = self.config.quantize(delta);
        let new_balance = self.config.quantize(balance + delta);

        let event =
            Self::write_balance_and_event(account_id, &mut tx, Some(delta), new_balance, event_type)
                .await?;

        tx.commit().await?;
        metrics::counter!("ledger_events_total").increment(1);
        Ok((new_balance, event))
    }

    async fn apply_debit_if_sufficient(
        &self,
        account_id: AccountId,
        delta: Decimal,
        event_type: BalanceEventType,
    ) -> Result<(Decimal, BalanceEvent)> {
        let mut tx = self.pool.begin().await?;

        let balance = Self::lock_balance(&mut tx, account_id).await?;
        let delta = self.config.quantize(delta);
        let new_balance = self.config.quantize(balance + delta);

        if new_balance < Decimal::ZERO {
            // Dropping the transaction rolls back; no balance change and no
            // event are committed.
            metrics::counter!("ledger_debits_rejected_total").increment(1);
            return Err(LedgerError::InsufficientFunds {
                account_id,
                balance,
                requested: delta,
            });
        }

        let event =
            Self::write_balance_and_event(account_id, &mut tx, Some(delta), new_balance, event_type)
                .await?;

        tx.commit().await?;
        metrics::counter!("ledger_events_total").increment(1);
        Ok((new_balance, event))
    }

    async fn set_balance(
        &self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(Decimal, BalanceEvent)> {
        let mut tx = self.pool.begin().await?;

        Self::lock_balance(&mut tx, account_id).await?;
        let new_balance = self.config.quantize(balance);

        let event = Self::write_balance_and_event(
            account_id,
            &mut tx,
            None,
            new_balance,
            BalanceEventType::ManuallyUpdated,
        )
        .await?;

        tx.commit().await?;
        metrics::counter!("ledger_events_total").increment(1);
        Ok((new_balance, event))
    }

    async fn record_login_state(
        &self,
        account_id: AccountId,
        streak: i32,
        login_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET continuous_login_streak = $2, last_login_at = $3
            WHERE id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(streak)
        .bind(login_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(())
    }

    async fn events_for_account(&self, account_id: AccountId) -> Result<Vec<BalanceEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, event_type, delta, balance_after, occurred_at, sequence_in_month
            FROM balance_events
            WHERE account_id = $1
            ORDER BY occurred_at ASC, sequence_in_month ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}
