//! Polling worker: PROCESSING -> PROCESSED | INVALID.
//!
//! Single consumer of the status queue. Terminal engine results settle
//! through the ledger; everything else — still computing, not yet known,
//! rate limits, transport failures — requeues with backoff. A transient
//! failure never produces a terminal mark.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adapters::{AccrualClient, StatusReply};
use crate::pipeline::{QueuedOrder, RetryPolicy};
use crate::storage::Store;

pub struct PollingWorker {
    store: Arc<dyn Store>,
    accrual: AccrualClient,
    rx: mpsc::Receiver<QueuedOrder>,
    retry_tx: mpsc::Sender<QueuedOrder>,
    retry: RetryPolicy,
}

impl PollingWorker {
    pub fn new(
        store: Arc<dyn Store>,
        accrual: AccrualClient,
        rx: mpsc::Receiver<QueuedOrder>,
        retry_tx: mpsc::Sender<QueuedOrder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            accrual,
            rx,
            retry_tx,
            retry,
        }
    }

    pub async fn run(mut self) {
        info!("Polling worker started");
        while let Some(item) = self.rx.recv().await {
            self.process(item).await;
        }
        info!("Polling worker stopped");
    }

    async fn process(&self, item: QueuedOrder) {
        match self.accrual.order_status(&item.number).await {
            Ok(StatusReply::Processed { amount }) => {
                match self.store.credit(&item.number, amount).await {
                    Ok(true) => {
                        info!("Order {} processed, credited {} minor units", item.number, amount)
                    }
                    Ok(false) => debug!("Order {} already credited", item.number),
                    Err(e) => {
                        error!("Failed to credit order {}: {}; requeueing", item.number, e);
                        self.requeue(item);
                    }
                }
            }
            Ok(StatusReply::Invalid) => match self.store.mark_invalid(&item.number).await {
                Ok(true) => info!("Order {} marked INVALID by the engine", item.number),
                Ok(false) => debug!("Order {} already terminal", item.number),
                Err(e) => {
                    error!(
                        "Failed to mark order {} INVALID: {}; requeueing",
                        item.number, e
                    );
                    self.requeue(item);
                }
            },
            Ok(reply) => {
                debug!("Order {} not terminal yet ({:?}); polling again", item.number, reply);
                self.requeue(item);
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Order {} status poll failed (attempt {}): {}; retrying with backoff",
                    item.number, item.attempt, e
                );
                self.requeue(item);
            }
            Err(e) => {
                // An unexpected engine reply is not grounds for a terminal
                // mark: the order may still have been processed upstream.
                error!(
                    "Order {} status poll returned an unexpected error: {}; requeueing",
                    item.number, e
                );
                self.requeue(item);
            }
        }
    }

    fn requeue(&self, item: QueuedOrder) {
        self.retry
            .requeue_later(self.retry_tx.clone(), item.retry(), item.attempt);
    }
}
