use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use common::AccountId;

use crate::{Account, BalanceEvent, BalanceEventType, Result};

/// Core trait for ledger store implementations.
///
/// The ledger is the single writer for account balances: no component may
/// mutate `balance` except through `apply_delta`, `apply_debit_if_sufficient`
/// or `set_balance`. Every successful mutation appends exactly one balance
/// event carrying the post-mutation balance and the next per-month sequence
/// number, atomically with the balance write.
///
/// All implementations must be thread-safe (Send + Sync) and must serialize
/// concurrent mutations to the same account (row lock or equivalent).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates a new account row.
    async fn create_account(&self, account: Account) -> Result<()>;

    /// Loads an account, failing with `AccountNotFound` when missing.
    async fn get_account(&self, account_id: AccountId) -> Result<Account>;

    /// Applies a signed delta to the account balance.
    ///
    /// Runs in one transaction: locks the account, computes the quantized
    /// new balance, writes it back, and appends the balance event. Returns
    /// the new balance and the committed event.
    async fn apply_delta(
        &self,
        account_id: AccountId,
        delta: Decimal,
        event_type: BalanceEventType,
    ) -> Result<(Decimal, BalanceEvent)>;

    /// Like `apply_delta`, but fails with `InsufficientFunds` when the
    /// resulting balance would be negative. Nothing is committed on failure.
    async fn apply_debit_if_sufficient(
        &self,
        account_id: AccountId,
        delta: Decimal,
        event_type: BalanceEventType,
    ) -> Result<(Decimal, BalanceEvent)>;

    /// Overwrites the balance with an absolute value and appends a
    /// `ManuallyUpdated` checkpoint event (`delta: None`).
    async fn set_balance(
        &self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(Decimal, BalanceEvent)>;

    /// Updates the login bookkeeping fields on the account.
    ///
    /// Login *rewards* go through `apply_delta`; this only records the
    /// streak counter and timestamp.
    async fn record_login_state(
        &self,
        account_id: AccountId,
        streak: i32,
        login_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns all events for an account in `occurred_at` order.
    async fn events_for_account(&self, account_id: AccountId) -> Result<Vec<BalanceEvent>>;
}

/// Extension trait providing convenience methods for ledger stores.
#[async_trait]
pub trait LedgerStoreExt: LedgerStore {
    /// Checks whether an account exists.
    async fn account_exists(&self, account_id: AccountId) -> Result<bool> {
        match self.get_account(account_id).await {
            Ok(_) => Ok(true),
            Err(crate::LedgerError::AccountNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sums the non-null deltas of an account's events.
    ///
    /// For an account whose history contains no checkpoint events this must
    /// equal its current balance.
    async fn replayed_balance(&self, account_id: AccountId) -> Result<Decimal> {
        let events = self.events_for_account(account_id).await?;
        Ok(events.iter().filter_map(|e| e.delta).sum())
    }
}

// Blanket implementation for all LedgerStore implementations
impl<T: LedgerStore + ?Sized> LedgerStoreExt for T {}
