use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use common::AccountId;

use crate::{
    Account, BalanceEvent, BalanceEventType, EventId, LedgerConfig, LedgerError, Result,
    store::LedgerStore,
};

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    events: Vec<BalanceEvent>,
}

/// In-memory ledger store implementation for testing.
///
/// Provides the same interface and semantics as the PostgreSQL
/// implementation; the write lock over the whole state stands in for the
/// per-account row lock.
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    config: LedgerConfig,
}

impl InMemoryLedgerStore {
    /// Creates a new empty in-memory ledger store.
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            config,
        }
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Clears all accounts and events.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.accounts.clear();
        state.events.clear();
    }

    fn next_sequence(state: &LedgerState, account_id: AccountId, at: DateTime<Utc>) -> i32 {
        state
            .events
            .iter()
            .filter(|e| {
                e.account_id == account_id
                    && e.occurred_at.year() == at.year()
                    && e.occurred_at.month() == at.month()
            })
            .map(|e| e.sequence_in_month)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn append_locked(
        &self,
        state: &mut LedgerState,
        account_id: AccountId,
        delta: Option<Decimal>,
        balance_after: Decimal,
        event_type: BalanceEventType,
    ) -> BalanceEvent {
        let now = Utc::now();
        let event = BalanceEvent {
            id: EventId::new(),
            account_id,
            event_type,
            delta,
            balance_after,
            occurred_at: now,
            sequence_in_month: Self::next_sequence(state, account_id, now),
        };
        state.events.push(event.clone());
        event
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Account> {
        let state = self.state.read().await;
        state
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    async fn apply_delta(
        &self,
        account_id: AccountId,
        delta: Decimal,
        event_type: BalanceEventType,
    ) -> Result<(Decimal, BalanceEvent)> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let delta = self.config.quantize(delta);
        let new_balance = self.config.quantize(account.balance + delta);

        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.balance = new_balance;
        }
        let event = self.append_locked(&mut state, account_id, Some(delta), new_balance, event_type);

        metrics::counter!("ledger_events_total").increment(1);
        Ok((new_balance, event))
    }

    async fn apply_debit_if_sufficient(
        &self,
        account_id: AccountId,
        delta: Decimal,
        event_type: BalanceEventType,
    ) -> Result<(Decimal, BalanceEvent)> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let delta = self.config.quantize(delta);
        let new_balance = self.config.quantize(account.balance + delta);

        if new_balance < Decimal::ZERO {
            metrics::counter!("ledger_debits_rejected_total").increment(1);
            return Err(LedgerError::InsufficientFunds {
                account_id,
                balance: account.balance,
                requested: delta,
            });
        }

        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.balance = new_balance;
        }
        let event = self.append_locked(&mut state, account_id, Some(delta), new_balance, event_type);

        metrics::counter!("ledger_events_total").increment(1);
        Ok((new_balance, event))
    }

    async fn set_balance(
        &self,
        account_id: AccountId,
        balance: Decimal,
    ) -> Result<(Decimal, BalanceEvent)> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(LedgerError::AccountNotFound(account_id));
        }

        let new_balance = self.config.quantize(balance);
        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.balance = new_balance;
        }
        let event = self.append_locked(
            &mut state,
            account_id,
            None,
            new_balance,
            BalanceEventType::ManuallyUpdated,
        );

        metrics::counter!("ledger_events_total").increment(1);
        Ok((new_balance, event))
    }

    async fn record_login_state(
        &self,
        account_id: AccountId,
        streak: i32,
        login_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        account.continuous_login_streak = streak;
        account.last_login_at = Some(login_at);
        Ok(())
    }

    async fn events_for_account(&self, account_id: AccountId) -> Result<Vec<BalanceEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.sequence_in_month.cmp(&b.sequence_in_month))
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerStoreExt;
    use rust_decimal_macros::dec;

    async fn store_with_account(balance: Decimal) -> (InMemoryLedgerStore, AccountId) {
        let store = InMemoryLedgerStore::default();
        let account_id = AccountId::new();
        store
            .create_account(Account::with_balance(account_id, balance))
            .await
            .unwrap();
        (store, account_id)
    }

    #[tokio::test]
    async fn apply_delta_credits_and_appends_event() {
        let (store, account_id) = store_with_account(dec!(10.000)).await;

        let (balance, event) = store
            .apply_delta(account_id, dec!(5.500), BalanceEventType::DonationGranted)
            .await
            .unwrap();

        assert_eq!(balance, dec!(15.500));
        assert_eq!(event.delta, Some(dec!(5.500)));
        assert_eq!(event.balance_after, dec!(15.500));
        assert_eq!(event.sequence_in_month, 1);
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn apply_delta_allows_negative_balance() {
        // The unchecked variant enforces nothing; non-negativity is a
        // convention of the checked debit path.
        let (store, account_id) = store_with_account(dec!(10.000)).await;

        let (balance, _) = store
            .apply_delta(account_id, dec!(-25.000), BalanceEventType::ManuallyUpdated)
            .await
            .unwrap();

        assert_eq!(balance, dec!(-15.000));
    }

    #[tokio::test]
    async fn debit_rejected_when_insufficient() {
        let (store, account_id) = store_with_account(dec!(50.000)).await;

        let result = store
            .apply_debit_if_sufficient(account_id, dec!(-100.000), BalanceEventType::Consumed)
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientFunds { .. })
        ));
        // No balance change and no event committed.
        let account = store.get_account(account_id).await.unwrap();
        assert_eq!(account.balance, dec!(50.000));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn debit_to_exactly_zero_is_allowed() {
        let (store, account_id) = store_with_account(dec!(50.000)).await;

        let (balance, _) = store
            .apply_debit_if_sufficient(account_id, dec!(-50.000), BalanceEventType::Consumed)
            .await
            .unwrap();

        assert_eq!(balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn set_balance_appends_checkpoint_without_delta() {
        let (store, account_id) = store_with_account(dec!(10.000)).await;

        let (balance, event) = store.set_balance(account_id, dec!(42.000)).await.unwrap();

        assert_eq!(balance, dec!(42.000));
        assert_eq!(event.event_type, BalanceEventType::ManuallyUpdated);
        assert_eq!(event.delta, None);
        assert_eq!(event.balance_after, dec!(42.000));
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let store = InMemoryLedgerStore::default();
        let result = store
            .apply_delta(AccountId::new(), dec!(1.000), BalanceEventType::Refunded)
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn balance_equals_sum_of_deltas_after_interleaved_operations() {
        let (store, account_id) = store_with_account(Decimal::ZERO).await;

        // Pseudo-random interleaving of credits and checked debits.
        let amounts = [
            dec!(10.000),
            dec!(-3.250),
            dec!(7.125),
            dec!(-0.875),
            dec!(100.000),
            dec!(-50.000),
            dec!(0.333),
            dec!(-12.999),
        ];
        for amount in amounts {
            if amount >= Decimal::ZERO {
                store
                    .apply_delta(account_id, amount, BalanceEventType::DonationGranted)
                    .await
                    .unwrap();
            } else {
                store
                    .apply_debit_if_sufficient(account_id, amount, BalanceEventType::Consumed)
                    .await
                    .unwrap();
            }
        }

        let account = store.get_account(account_id).await.unwrap();
        assert_eq!(store.replayed_balance(account_id).await.unwrap(), account.balance);
    }

    #[tokio::test]
    async fn sequence_in_month_is_gapless_under_concurrent_writers() {
        let (store, account_id) = store_with_account(Decimal::ZERO).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_delta(account_id, dec!(1.000), BalanceEventType::ConsecutiveLogin)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut sequences: Vec<i32> = store
            .events_for_account(account_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence_in_month)
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=32).collect::<Vec<i32>>());

        let account = store.get_account(account_id).await.unwrap();
        assert_eq!(account.balance, dec!(32.000));
    }

    #[tokio::test]
    async fn deltas_are_quantized_before_persisting() {
        let (store, account_id) = store_with_account(Decimal::ZERO).await;

        let (balance, event) = store
            .apply_delta(account_id, dec!(1.00049), BalanceEventType::DonationGranted)
            .await
            .unwrap();

        assert_eq!(event.delta, Some(dec!(1.000)));
        assert_eq!(balance, dec!(1.000));
    }

    #[tokio::test]
    async fn record_login_state_updates_account_fields() {
        let (store, account_id) = store_with_account(Decimal::ZERO).await;
        let now = Utc::now();

        store.record_login_state(account_id, 3, now).await.unwrap();

        let account = store.get_account(account_id).await.unwrap();
        assert_eq!(account.continuous_login_streak, 3);
        assert_eq!(account.last_login_at, Some(now));
        // Bookkeeping only, no ledger event.
        assert_eq!(store.event_count().await, 0);
    }
}
