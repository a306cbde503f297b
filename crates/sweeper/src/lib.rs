//! Order expiry sweeper.
//!
//! Periodically reclaims orders that sat unfinished past their channel's
//! deadline. One capped, oldest-first work queue feeds two disjoint paths:
//! never-started orders are released as a batch, in-flight orders are
//! compensated one at a time so a single bad order cannot abort the run.

pub mod error;
pub mod scheduler;
pub mod sweep;

pub use error::SweepError;
pub use scheduler::run_on_interval;
pub use sweep::{ExpirySweeper, SweepReport, SweeperConfig};
