//! Crash-recovery bootstrapping.
//!
//! Queued work lives in memory; a crash loses it. On startup every order
//! left in a non-terminal state is re-enqueued: NEW orders back onto the
//! submission queue, PROCESSING orders onto the status queue. An order that
//! was mid-flight at shutdown may be enqueued twice — the ledger's
//! idempotent guard absorbs that, not queue-level deduplication.

use tracing::info;

use crate::domain::OrderStatus;
use crate::error::Result;
use crate::pipeline::PipelineHandle;
use crate::storage::Store;

/// Summary of re-enqueued work, for startup logging
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub resubmitted: usize,
    pub repolled: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.resubmitted == 0 && self.repolled == 0
    }

    pub fn log_summary(&self) {
        if self.is_clean() {
            info!("No crash recovery needed - clean startup");
        } else {
            info!(
                "Crash recovery: re-enqueued {} NEW and {} PROCESSING orders",
                self.resubmitted, self.repolled
            );
        }
    }
}

/// Re-enqueue all non-terminal orders. Call after the workers are spawned:
/// the enqueues block on queue capacity and rely on the consumers draining.
pub async fn recover(store: &dyn Store, handle: &PipelineHandle) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for order in store.orders_by_status(OrderStatus::New).await? {
        handle.enqueue_submission(&order.number).await?;
        report.resubmitted += 1;
    }

    for order in store.orders_by_status(OrderStatus::Processing).await? {
        handle.enqueue_status(&order.number).await?;
        report.repolled += 1;
    }

    report.log_summary();
    Ok(report)
}
