//! The expiry sweep itself.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;

use domain::{Order, OrderStatus};
use settlement::{Notifier, OrderRepository, StockService, VoucherService};

use crate::error::Result;

/// Tuning knobs for one sweep run.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Maximum orders taken from the work queue per run.
    pub batch_size: i64,

    /// Soft cap on a run's wall-clock time. When exceeded, the rest of the
    /// queue is left for the next run.
    pub time_budget: Option<Duration>,

    /// Per-order cap on the compensate path.
    pub per_order_timeout: Option<Duration>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            time_budget: None,
            per_order_timeout: None,
        }
    }
}

/// What one sweep run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Never-started orders released as a batch.
    pub released: usize,

    /// In-flight orders compensated individually.
    pub compensated: usize,

    /// Orders (or release batches) that failed and were skipped.
    pub failed: usize,
}

/// Expires orders past their channel's deadline.
pub struct ExpirySweeper {
    orders: Arc<dyn OrderRepository>,
    vouchers: Arc<dyn VoucherService>,
    stock: Arc<dyn StockService>,
    notifier: Arc<dyn Notifier>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        vouchers: Arc<dyn VoucherService>,
        stock: Arc<dyn StockService>,
        notifier: Arc<dyn Notifier>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            orders,
            vouchers,
            stock,
            notifier,
            config,
        }
    }

    /// Runs one sweep.
    ///
    /// The queue is split by a disjoint predicate: orders that never started
    /// (unconfirmed and unpaid) take the cheap batch release; everything else
    /// eligible is compensated per order. `Expired` is terminal and excluded
    /// from the queue, so re-running an up-to-date sweep changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = Utc::now();
        let queue = self.orders.expirable(now, self.config.batch_size).await?;

        let (release, compensate): (Vec<Order>, Vec<Order>) = queue
            .into_iter()
            .partition(|order| {
                order.status == OrderStatus::Unconfirmed && order.charge_status.is_unpaid()
            });

        let mut report = SweepReport::default();

        if !release.is_empty() {
            match self.release_batch(&release).await {
                Ok(()) => report.released = release.len(),
                Err(e) => {
                    tracing::error!(batch = release.len(), error = %e, "release batch failed");
                    report.failed += release.len();
                }
            }
        }

        for order in &compensate {
            if let Some(budget) = self.config.time_budget
                && started.elapsed() >= budget
            {
                tracing::info!("time budget exhausted, deferring the rest of the queue");
                break;
            }

            let outcome = match self.config.per_order_timeout {
                Some(timeout) => {
                    match tokio::time::timeout(timeout, self.compensate_order(order)).await {
                        Ok(result) => result,
                        Err(_) => Err(crate::SweepError::Settlement(
                            settlement::SettlementError::InvalidState(format!(
                                "compensation for order {} timed out",
                                order.id
                            )),
                        )),
                    }
                }
                None => self.compensate_order(order).await,
            };

            match outcome {
                Ok(()) => report.compensated += 1,
                Err(e) => {
                    tracing::error!(order_id = %order.id, error = %e, "compensation failed, skipping");
                    report.failed += 1;
                }
            }
        }

        metrics::counter!("orders_expired_total")
            .increment((report.released + report.compensated) as u64);
        metrics::histogram!("sweep_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            released = report.released,
            compensated = report.compensated,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    /// Releases a batch of never-started orders in one go.
    async fn release_batch(&self, orders: &[Order]) -> Result<()> {
        let now = Utc::now();
        let ids: Vec<_> = orders.iter().map(|order| order.id).collect();

        self.vouchers.release_usage(&ids).await?;
        self.vouchers.remove_customer_records(&ids).await?;
        self.stock.deallocate_for_orders(&ids).await?;
        // Status flips and their audit events land together; a crash here
        // cannot leave an EXPIRED event on a still-open order for the next
        // run to re-release.
        self.orders.expire_with_events(&ids, now).await?;

        self.notify_expired(&ids).await;
        Ok(())
    }

    /// Compensates one in-flight order.
    async fn compensate_order(&self, order: &Order) -> Result<()> {
        let now = Utc::now();

        self.stock.remove_reservations(order.id).await?;
        if order.status == OrderStatus::PartiallyFulfilled {
            self.stock.create_compensating_fulfillments(order).await?;
        }
        self.orders.expire_with_events(&[order.id], now).await?;

        self.notify_expired(&[order.id]).await;
        Ok(())
    }

    async fn notify_expired(&self, ids: &[common::OrderId]) {
        let payload = json!({ "order_ids": ids });
        if let Err(e) = self.notifier.notify("order_expired", payload).await {
            tracing::warn!(error = %e, "expiry notification failed");
        }
    }
}
