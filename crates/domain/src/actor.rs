//! The identity on whose behalf a settlement operation runs.

use serde::{Deserialize, Serialize};

use common::AccountId;

/// Caller identity for permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: AccountId,
    pub is_staff: bool,
}

impl Actor {
    pub fn staff(account_id: AccountId) -> Self {
        Self {
            account_id,
            is_staff: true,
        }
    }

    pub fn customer(account_id: AccountId) -> Self {
        Self {
            account_id,
            is_staff: false,
        }
    }

    /// True if this actor owns the given account.
    pub fn owns(&self, account_id: AccountId) -> bool {
        self.account_id == account_id
    }
}
