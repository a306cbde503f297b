//! Sweeper error types.

use settlement::SettlementError;
use thiserror::Error;

/// Errors that abort a whole sweep run.
///
/// Failures scoped to one order (or one release batch) are caught inside
/// the run, logged, and counted in the report instead.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Settlement or repository error while building the work queue.
    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),
}

/// Convenience type alias for sweep results.
pub type Result<T> = std::result::Result<T, SweepError>;
