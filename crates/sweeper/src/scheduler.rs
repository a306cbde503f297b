//! Interval scheduling for the sweeper.

use std::time::Duration;

use crate::sweep::ExpirySweeper;

/// Drives the sweeper on a fixed interval until the task is aborted.
///
/// A failed run is logged and the loop keeps going; skipped or failed
/// orders are simply picked up by a later tick.
pub async fn run_on_interval(sweeper: ExpirySweeper, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match sweeper.run_sweep().await {
            Ok(report) => {
                tracing::debug!(
                    released = report.released,
                    compensated = report.compensated,
                    failed = report.failed,
                    "scheduled sweep finished"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduled sweep failed");
            }
        }
    }
}
