//! Submission worker: NEW -> PROCESSING.
//!
//! Single consumer of the submission queue. Each dequeued order is offered
//! to the accrual engine; acceptance moves it to PROCESSING and hands it to
//! the polling worker, transient upstream failures requeue it with backoff,
//! and a permanent upstream rejection marks it INVALID.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adapters::AccrualClient;
use crate::pipeline::{QueuedOrder, RetryPolicy};
use crate::storage::Store;

pub struct SubmissionWorker {
    store: Arc<dyn Store>,
    accrual: AccrualClient,
    rx: mpsc::Receiver<QueuedOrder>,
    retry_tx: mpsc::Sender<QueuedOrder>,
    status_tx: mpsc::Sender<QueuedOrder>,
    retry: RetryPolicy,
}

impl SubmissionWorker {
    pub fn new(
        store: Arc<dyn Store>,
        accrual: AccrualClient,
        rx: mpsc::Receiver<QueuedOrder>,
        retry_tx: mpsc::Sender<QueuedOrder>,
        status_tx: mpsc::Sender<QueuedOrder>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            accrual,
            rx,
            retry_tx,
            status_tx,
            retry,
        }
    }

    pub async fn run(mut self) {
        info!("Submission worker started");
        while let Some(item) = self.rx.recv().await {
            self.process(item).await;
        }
        info!("Submission worker stopped");
    }

    async fn process(&self, item: QueuedOrder) {
        match self.accrual.register_order(&item.number).await {
            Ok(reply) => {
                debug!("Order {} submitted: {:?}", item.number, reply);
                self.advance_to_polling(item).await;
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Order {} submission failed (attempt {}): {}; retrying with backoff",
                    item.number, item.attempt, e
                );
                self.retry
                    .requeue_later(self.retry_tx.clone(), item.retry(), item.attempt);
            }
            Err(e) => {
                warn!(
                    "Order {} permanently rejected by the accrual engine: {}",
                    item.number, e
                );
                match self.store.mark_invalid(&item.number).await {
                    Ok(true) => info!("Order {} marked INVALID", item.number),
                    Ok(false) => debug!("Order {} already terminal", item.number),
                    Err(e) => {
                        error!(
                            "Failed to mark order {} INVALID: {}; requeueing",
                            item.number, e
                        );
                        self.retry
                            .requeue_later(self.retry_tx.clone(), item.retry(), item.attempt);
                    }
                }
            }
        }
    }

    /// Transition NEW -> PROCESSING (no-op on redelivery) and enqueue the
    /// order onto the status queue with a fresh attempt count.
    async fn advance_to_polling(&self, item: QueuedOrder) {
        match self.store.mark_processing(&item.number).await {
            Ok(moved) => {
                if !moved {
                    debug!("Order {} already past NEW", item.number);
                }
                if self
                    .status_tx
                    .send(QueuedOrder::new(&item.number))
                    .await
                    .is_err()
                {
                    warn!("Status queue closed; dropping order {}", item.number);
                }
            }
            Err(e) => {
                error!(
                    "Failed to move order {} to PROCESSING: {}; requeueing",
                    item.number, e
                );
                self.retry
                    .requeue_later(self.retry_tx.clone(), item.retry(), item.attempt);
            }
        }
    }
}
