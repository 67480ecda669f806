//! Asynchronous order-accrual reconciliation pipeline.
//!
//! The pipeline owns two bounded queues and the workers that consume them:
//! the submission worker sends NEW orders to the accrual engine, the
//! polling worker follows PROCESSING orders to a terminal state and settles
//! them through the ledger. Enqueueing blocks when a queue is full so that
//! a slow engine throttles intake instead of growing memory.

pub mod bootstrap;
pub mod polling;
pub mod retry;
pub mod submission;

pub use bootstrap::{recover, RecoveryReport};
pub use polling::PollingWorker;
pub use retry::RetryPolicy;
pub use submission::SubmissionWorker;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapters::AccrualClient;
use crate::error::{Result, TallyError};
use crate::storage::Store;

/// Runtime settings for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded capacity of each worker queue
    pub queue_capacity: usize,
    /// Backoff policy shared by both workers
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// A unit of queued work: one order number plus its retry attempt count.
#[derive(Debug, Clone)]
pub struct QueuedOrder {
    pub number: String,
    pub attempt: u32,
}

impl QueuedOrder {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            attempt: 0,
        }
    }

    /// The same order, one attempt later.
    pub fn retry(&self) -> Self {
        Self {
            number: self.number.clone(),
            attempt: self.attempt + 1,
        }
    }
}

/// Cloneable producer side of the pipeline, handed to intake and the
/// bootstrapper. Sends block when the target queue is full (backpressure).
#[derive(Clone)]
pub struct PipelineHandle {
    pub(crate) submission_tx: mpsc::Sender<QueuedOrder>,
    pub(crate) status_tx: mpsc::Sender<QueuedOrder>,
}

impl PipelineHandle {
    /// Enqueue a freshly registered order for submission to the engine.
    pub async fn enqueue_submission(&self, number: &str) -> Result<()> {
        self.submission_tx
            .send(QueuedOrder::new(number))
            .await
            .map_err(|_| TallyError::Internal("submission queue closed".to_string()))
    }

    /// Enqueue an order for status polling.
    pub async fn enqueue_status(&self, number: &str) -> Result<()> {
        self.status_tx
            .send(QueuedOrder::new(number))
            .await
            .map_err(|_| TallyError::Internal("status queue closed".to_string()))
    }
}

/// The constructed pipeline: queues plus the two single-consumer workers.
/// No ambient state; whoever builds it owns it.
pub struct Pipeline {
    handle: PipelineHandle,
    submission_worker: SubmissionWorker,
    polling_worker: PollingWorker,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>, accrual: AccrualClient, config: PipelineConfig) -> Self {
        let (submission_tx, submission_rx) = mpsc::channel(config.queue_capacity);
        let (status_tx, status_rx) = mpsc::channel(config.queue_capacity);

        let handle = PipelineHandle {
            submission_tx: submission_tx.clone(),
            status_tx: status_tx.clone(),
        };

        let submission_worker = SubmissionWorker::new(
            store.clone(),
            accrual.clone(),
            submission_rx,
            submission_tx,
            status_tx.clone(),
            config.retry.clone(),
        );
        let polling_worker =
            PollingWorker::new(store, accrual, status_rx, status_tx, config.retry);

        Self {
            handle,
            submission_worker,
            polling_worker,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Spawn both worker loops. They run until the process shuts down (or
    /// every producer handle is dropped and the queues drain).
    pub fn spawn(self) -> (PipelineHandle, Vec<JoinHandle<()>>) {
        let handles = vec![
            tokio::spawn(self.submission_worker.run()),
            tokio::spawn(self.polling_worker.run()),
        ];
        (self.handle, handles)
    }
}
