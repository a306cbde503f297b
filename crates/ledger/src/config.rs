//! Ledger configuration, injected at store/service construction.

use rust_decimal::{Decimal, RoundingStrategy};

/// Configuration for the ledger and its login-reward policy.
///
/// Passed explicitly to the stores and services that need it; nothing in
/// this crate reads ambient global state.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Number of fractional digits every persisted amount is quantized to.
    pub scale: u32,

    /// One-time credit granted on an account's first login.
    pub first_login_bonus: Decimal,

    /// Daily login bonuses indexed by consecutive-login streak (day 1 is
    /// index 0). Streaks beyond the table length receive the last entry.
    pub continuous_login_bonuses: Vec<Decimal>,
}

impl LedgerConfig {
    /// Quantizes an amount to the configured scale using banker's rounding.
    pub fn quantize(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointNearestEven)
    }

    /// Returns the login bonus for a given 1-based streak day.
    ///
    /// Streaks past the end of the table are clamped to the last entry.
    /// Returns zero when the bonus table is empty.
    pub fn bonus_for_streak(&self, streak: i32) -> Decimal {
        if self.continuous_login_bonuses.is_empty() || streak < 1 {
            return Decimal::ZERO;
        }
        let index = usize::min(
            streak as usize - 1,
            self.continuous_login_bonuses.len() - 1,
        );
        self.continuous_login_bonuses[index]
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            scale: 3,
            first_login_bonus: Decimal::new(300_000, 3),
            continuous_login_bonuses: vec![
                Decimal::new(1_000, 3),
                Decimal::new(2_000, 3),
                Decimal::new(3_000, 3),
                Decimal::new(4_000, 3),
                Decimal::new(5_000, 3),
            ],
        }
    }
}
