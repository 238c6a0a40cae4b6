// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operation processor.
//!
//! Consumes queued subscribe/unsubscribe operations and applies each one to
//! the subscriber store. Delivery is at-least-once, so applying the same
//! operation twice must leave the same record behind (modulo `updated_at`).
//!
//! Failure handling:
//! - A body that does not parse as an operation is poison: it is logged and
//!   dropped so it never blocks the queue.
//! - A subscribe whose name would fail intake validation is poison too.
//! - A transient store failure hands the message back for redelivery
//!   (Cloud Tasks sees a 500; the local queue requeues it). Any other store
//!   error is dropped, since replaying it cannot change the outcome.

use crate::db::SubscriberDb;
use crate::error::AppError;
use crate::models::subscriber::parse_name;
use crate::models::{Operation, Transition};
use crate::services::queue::LocalQueue;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// Operations applied concurrently by the local worker.
pub const MAX_CONCURRENT_OPERATIONS: usize = 16;

/// How long the local worker idles before polling the queue again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Processing errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The message can never succeed; retrying is pointless.
    #[error("Poison message: {0}")]
    Poison(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

/// What the queue should do with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Applied; remove it.
    Ack,
    /// Transient failure; deliver again later.
    Retry,
    /// Poison; remove it without applying.
    Drop,
}

/// Counts from one pass over the local queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub received: usize,
    pub acked: usize,
    pub retried: usize,
    pub dropped: usize,
}

#[derive(Clone)]
pub struct OperationProcessor {
    db: SubscriberDb,
}

impl OperationProcessor {
    pub fn new(db: SubscriberDb) -> Self {
        Self { db }
    }

    /// Decode a queue message body.
    ///
    /// Subscribe names go through the same normalization as intake.
    pub fn parse(body: &[u8]) -> Result<Operation, ProcessError> {
        let mut operation: Operation =
            serde_json::from_slice(body).map_err(|e| ProcessError::Poison(e.to_string()))?;

        if let Operation::Subscribe(intent) = &mut operation {
            intent.name = parse_name(intent.name.as_deref()).map_err(ProcessError::Poison)?;
        }

        Ok(operation)
    }

    /// Apply an operation stamped with the current time.
    pub async fn apply(&self, operation: &Operation) -> Result<Transition, ProcessError> {
        self.apply_at(operation, Utc::now()).await
    }

    /// Apply an operation as if processed at `now`.
    pub async fn apply_at(
        &self,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> Result<Transition, ProcessError> {
        let transition = self.db.apply_operation(operation, now).await?;

        match transition.record() {
            Some(record) => tracing::info!(
                operation = operation.kind(),
                outcome = transition.label(),
                subscriber_id = %record.id,
                "Operation applied"
            ),
            None => tracing::info!(
                operation = operation.kind(),
                outcome = transition.label(),
                "Operation had no effect"
            ),
        }

        Ok(transition)
    }

    /// Parse and apply one raw message, deciding its fate.
    pub async fn handle_message(&self, body: &[u8]) -> Disposition {
        let result = match Self::parse(body) {
            Ok(operation) => self.apply(&operation).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Disposition::Ack,
            Err(ProcessError::Poison(reason)) => {
                tracing::error!(
                    reason = %reason,
                    bytes = body.len(),
                    "Dropping undecodable operation"
                );
                Disposition::Drop
            }
            Err(ProcessError::Store(e)) => store_failure_disposition(&e),
        }
    }

    /// Process every message currently ready in the local queue, once.
    ///
    /// Messages released for retry are left for the next pass.
    pub async fn drain(&self, queue: &LocalQueue) -> DrainSummary {
        let deliveries = queue.receive(usize::MAX).await;
        let received = deliveries.len();

        let dispositions: Vec<Disposition> = stream::iter(deliveries)
            .map(|delivery| async move {
                let disposition = self.handle_message(&delivery.body).await;
                match disposition {
                    Disposition::Ack | Disposition::Drop => queue.ack(delivery.receipt).await,
                    Disposition::Retry => {
                        queue.release(delivery.receipt).await;
                    }
                }
                disposition
            })
            .buffer_unordered(MAX_CONCURRENT_OPERATIONS)
            .collect()
            .await;

        let count = |d: Disposition| dispositions.iter().filter(|x| **x == d).count();
        DrainSummary {
            received,
            acked: count(Disposition::Ack),
            retried: count(Disposition::Retry),
            dropped: count(Disposition::Drop),
        }
    }

    /// Background loop for the local queue backend. Never returns.
    pub async fn run_local_worker(self, queue: Arc<LocalQueue>) {
        tracing::info!(
            concurrency = MAX_CONCURRENT_OPERATIONS,
            "Local operation worker started"
        );

        loop {
            let summary = self.drain(&queue).await;

            if summary.received > 0 {
                tracing::debug!(
                    received = summary.received,
                    acked = summary.acked,
                    retried = summary.retried,
                    dropped = summary.dropped,
                    "Drained operation queue"
                );
            }

            // Back off when nothing moved or the store is failing.
            if summary.received == 0 || summary.retried > 0 {
                queue.wait_for_message(POLL_INTERVAL).await;
            }
        }
    }
}

fn store_failure_disposition(error: &AppError) -> Disposition {
    if error.is_transient() {
        tracing::warn!(error = %error, "Operation failed, will retry");
        Disposition::Retry
    } else {
        tracing::error!(error = %error, "Operation failed permanently, dropping");
        Disposition::Drop
    }
}
