//! Bounded retry for concurrency conflicts.

use std::future::Future;
use std::time::Duration;

use crate::{LedgerError, Result};

/// Retry policy for ledger operations that can hit lock conflicts.
///
/// Only `ConcurrencyConflict` is retried; business failures (insufficient
/// funds, missing accounts) represent real preconditions that retries
/// cannot fix and pass through untouched.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Backoff before the first retry; doubles on each subsequent one.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(20),
        }
    }
}

/// Runs `op`, retrying on `ConcurrencyConflict` with exponential backoff
/// up to the policy's attempt bound.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.base_backoff;
    let mut attempt = 1;

    loop {
        match op().await {
            Err(LedgerError::ConcurrencyConflict { account_id }) if attempt < policy.max_attempts => {
                tracing::debug!(%account_id, attempt, "retrying after concurrency conflict");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AccountId;
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(fast_policy(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_conflicts_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let account_id = AccountId::new();
        let result = with_retry(fast_policy(), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LedgerError::ConcurrencyConflict { account_id })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let account_id = AccountId::new();
        let result: Result<()> = with_retry(fast_policy(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::ConcurrencyConflict { account_id })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(LedgerError::ConcurrencyConflict { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let account_id = AccountId::new();
        let result: Result<()> = with_retry(fast_policy(), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LedgerError::InsufficientFunds {
                    account_id,
                    balance: Decimal::ZERO,
                    requested: Decimal::ONE,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
