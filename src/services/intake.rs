//! Order intake: validate, register, enqueue.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::luhn;
use crate::error::Result;
use crate::pipeline::PipelineHandle;
use crate::storage::{RegisterOutcome, Store};

/// Synchronous entry point for new order numbers. Returns as soon as the
/// order is durably registered and queued; accrual happens asynchronously.
pub struct OrderIntake {
    store: Arc<dyn Store>,
    pipeline: PipelineHandle,
}

impl OrderIntake {
    pub fn new(store: Arc<dyn Store>, pipeline: PipelineHandle) -> Self {
        Self { store, pipeline }
    }

    /// Register an order number for a user.
    ///
    /// - unclaimed number: creates the order at NEW, enqueues it for
    ///   submission, returns `Created`;
    /// - already claimed by the same user: `AlreadyOwned`, no mutation;
    /// - claimed by another user: `OrderConflict`, no mutation;
    /// - Luhn-invalid number: `InvalidNumber`, never enters the pipeline.
    pub async fn register(&self, uid: Uuid, number: &str) -> Result<RegisterOutcome> {
        luhn::validate(number)?;

        let outcome = self.store.register_order(uid, number).await?;
        if outcome.is_created() {
            self.pipeline.enqueue_submission(number).await?;
            info!("Order {} accepted from user {}", number, uid);
        }
        Ok(outcome)
    }
}
