//! Login-reward crediting driven by the identity subsystem's login events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use common::AccountId;

use crate::{BalanceEvent, BalanceEventType, LedgerConfig, LedgerStore, Result};

/// Summary of the ledger effects of one login.
#[derive(Debug, Clone, Default)]
pub struct LoginOutcome {
    /// New consecutive-login streak after this login.
    pub streak: i32,

    /// Events appended for this login (first-login bonus and/or the daily
    /// consecutive bonus). Empty for a same-day repeat login.
    pub events: Vec<BalanceEvent>,
}

/// Credits login rewards against the ledger.
///
/// The login handler calls `record_login` once per authentication; the
/// service decides whether the login is the account's first ever, extends a
/// streak, or is a same-day repeat, and applies the configured bonuses.
pub struct LoginRewards<S: LedgerStore> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> LoginRewards<S> {
    /// Creates a new login-reward service over the given store.
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying ledger store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a login at `login_at` and credits any rewards due.
    #[tracing::instrument(skip(self))]
    pub async fn record_login(
        &self,
        account_id: AccountId,
        login_at: DateTime<Utc>,
    ) -> Result<LoginOutcome> {
        let account = self.store.get_account(account_id).await?;

        let mut events = Vec::new();
        let streak = match account.last_login_at {
            None => {
                // First ever login: welcome bonus plus the day-1 streak bonus.
                if self.config.first_login_bonus > Decimal::ZERO {
                    let (_, event) = self
                        .store
                        .apply_delta(
                            account_id,
                            self.config.first_login_bonus,
                            BalanceEventType::FirstLogin,
                        )
                        .await?;
                    events.push(event);
                }
                if let Some(event) = self.credit_streak_bonus(account_id, 1).await? {
                    events.push(event);
                }
                1
            }
            Some(last) => {
                let day_gap = login_at.date_naive().signed_duration_since(last.date_naive());
                match day_gap.num_days() {
                    // Same day: no reward, just refresh the timestamp.
                    d if d <= 0 => account.continuous_login_streak,
                    // Next calendar day: streak continues.
                    1 => {
                        let streak = account.continuous_login_streak + 1;
                        if let Some(event) = self.credit_streak_bonus(account_id, streak).await? {
                            events.push(event);
                        }
                        streak
                    }
                    // Gap: streak restarts at day 1.
                    _ => {
                        if let Some(event) = self.credit_streak_bonus(account_id, 1).await? {
                            events.push(event);
                        }
                        1
                    }
                }
            }
        };

        self.store
            .record_login_state(account_id, streak, login_at)
            .await?;

        tracing::debug!(%account_id, streak, rewards = events.len(), "login recorded");
        Ok(LoginOutcome { streak, events })
    }

    async fn credit_streak_bonus(
        &self,
        account_id: AccountId,
        streak: i32,
    ) -> Result<Option<BalanceEvent>> {
        let bonus = self.config.bonus_for_streak(streak);
        if bonus <= Decimal::ZERO {
            return Ok(None);
        }
        let (_, event) = self
            .store
            .apply_delta(account_id, bonus, BalanceEventType::ConsecutiveLogin)
            .await?;
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Account, InMemoryLedgerStore};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn rewards() -> (LoginRewards<InMemoryLedgerStore>, AccountId) {
        let store = InMemoryLedgerStore::default();
        let account_id = AccountId::new();
        let service = LoginRewards::new(store, LedgerConfig::default());
        (service, account_id)
    }

    async fn seed(service: &LoginRewards<InMemoryLedgerStore>, account_id: AccountId) {
        service
            .store()
            .create_account(Account::new(account_id))
            .await
            .unwrap();
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, d, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_login_grants_welcome_and_day_one_bonus() {
        let (service, account_id) = rewards();
        seed(&service, account_id).await;

        let outcome = service.record_login(account_id, day(1)).await.unwrap();

        assert_eq!(outcome.streak, 1);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.events[0].event_type, BalanceEventType::FirstLogin);
        assert_eq!(outcome.events[1].event_type, BalanceEventType::ConsecutiveLogin);

        let account = service.store().get_account(account_id).await.unwrap();
        // 300.000 welcome + 1.000 day-1 bonus
        assert_eq!(account.balance, dec!(301.000));
        assert_eq!(account.continuous_login_streak, 1);
    }

    #[tokio::test]
    async fn next_day_login_extends_streak() {
        let (service, account_id) = rewards();
        seed(&service, account_id).await;

        service.record_login(account_id, day(1)).await.unwrap();
        let outcome = service.record_login(account_id, day(2)).await.unwrap();

        assert_eq!(outcome.streak, 2);
        assert_eq!(outcome.events.len(), 1);

        let account = service.store().get_account(account_id).await.unwrap();
        // 301.000 + 2.000 day-2 bonus
        assert_eq!(account.balance, dec!(303.000));
    }

    #[tokio::test]
    async fn same_day_repeat_login_grants_nothing() {
        let (service, account_id) = rewards();
        seed(&service, account_id).await;

        service.record_login(account_id, day(1)).await.unwrap();
        let outcome = service
            .record_login(account_id, day(1) + Duration::hours(5))
            .await
            .unwrap();

        assert_eq!(outcome.streak, 1);
        assert!(outcome.events.is_empty());

        let account = service.store().get_account(account_id).await.unwrap();
        assert_eq!(account.balance, dec!(301.000));
        assert_eq!(
            account.last_login_at,
            Some(day(1) + Duration::hours(5))
        );
    }

    #[tokio::test]
    async fn gap_resets_streak_to_day_one() {
        let (service, account_id) = rewards();
        seed(&service, account_id).await;

        service.record_login(account_id, day(1)).await.unwrap();
        service.record_login(account_id, day(2)).await.unwrap();
        let outcome = service.record_login(account_id, day(10)).await.unwrap();

        assert_eq!(outcome.streak, 1);
        let account = service.store().get_account(account_id).await.unwrap();
        // 303.000 + day-1 bonus again
        assert_eq!(account.balance, dec!(304.000));
        assert_eq!(account.continuous_login_streak, 1);
    }

    #[tokio::test]
    async fn streak_bonus_clamps_past_table_end() {
        let (service, account_id) = rewards();
        seed(&service, account_id).await;

        for d in 1..=8 {
            service.record_login(account_id, day(d)).await.unwrap();
        }

        let account = service.store().get_account(account_id).await.unwrap();
        assert_eq!(account.continuous_login_streak, 8);
        // 300 + (1+2+3+4+5) + 5+5+5 for days 6..8
        assert_eq!(account.balance, dec!(330.000));
    }
}
