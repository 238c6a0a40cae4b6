// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operation queue.
//!
//! Production traffic goes through Cloud Tasks, which pushes each message to
//! `/tasks/process-operation` and retries on non-2xx responses. The local
//! queue gives the same at-least-once contract in-process: a received
//! message stays in flight until it is acked or released back for
//! redelivery. Released messages stay invisible for an exponentially growing
//! delay, like a Cloud Tasks queue's `min_backoff`/`max_backoff`, so a short
//! store outage does not burn through every attempt.

use crate::error::{AppError, Result};
use crate::models::Operation;
use crate::services::tasks::TasksService;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Deliveries per message before it is dead-lettered.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Redelivery delay: `min` after the first failure, doubling up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub min: Duration,
    pub max: Duration,
}

impl RetryBackoff {
    /// Redeliver immediately.
    pub const NONE: RetryBackoff = RetryBackoff {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    /// Delay before redelivering a message that has failed `attempts` times.
    pub fn delay(&self, attempts: u32) -> Duration {
        let doublings = attempts.saturating_sub(1).min(16);
        self.min.saturating_mul(1 << doublings).min(self.max)
    }
}

impl Default for RetryBackoff {
    /// 1s, 2s, 4s, 8s across the default attempt budget.
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Handle for `ack` / `release`.
    pub receipt: u64,
    pub body: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
}

#[derive(Debug)]
struct Message {
    body: Vec<u8>,
    attempts: u32,
    /// Hidden from `receive` until this instant.
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<u64, Message>,
    dead_letters: Vec<Vec<u8>>,
    next_receipt: u64,
}

/// In-process at-least-once queue.
#[derive(Debug, Default)]
pub struct LocalQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: RetryBackoff,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backoff(backoff: RetryBackoff) -> Self {
        Self {
            backoff,
            ..Self::default()
        }
    }

    pub async fn send(&self, body: Vec<u8>) {
        self.state.lock().await.ready.push_back(Message {
            body,
            attempts: 0,
            visible_at: Instant::now(),
        });
        self.notify.notify_one();
    }

    /// Take up to `max` visible messages and mark them in flight.
    ///
    /// Messages still backing off keep their place in line.
    pub async fn receive(&self, max: usize) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let mut deliveries = Vec::new();
        let mut delayed = VecDeque::new();

        while deliveries.len() < max {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };
            if message.visible_at > now {
                delayed.push_back(message);
                continue;
            }
            message.attempts += 1;

            let receipt = state.next_receipt;
            state.next_receipt += 1;

            deliveries.push(Delivery {
                receipt,
                body: message.body.clone(),
                attempt: message.attempts,
            });
            state.in_flight.insert(receipt, message);
        }

        while let Some(message) = delayed.pop_back() {
            state.ready.push_front(message);
        }

        deliveries
    }

    /// Remove a delivered message for good.
    pub async fn ack(&self, receipt: u64) {
        self.state.lock().await.in_flight.remove(&receipt);
    }

    /// Return a delivered message for redelivery after its backoff delay.
    ///
    /// Returns `false` if the message ran out of attempts and was moved to the
    /// dead-letter list instead.
    pub async fn release(&self, receipt: u64) -> bool {
        let mut state = self.state.lock().await;
        let Some(mut message) = state.in_flight.remove(&receipt) else {
            return false;
        };

        if message.attempts >= MAX_DELIVERY_ATTEMPTS {
            tracing::error!(
                receipt,
                attempts = message.attempts,
                "Operation exhausted delivery attempts, moving to dead letters"
            );
            state.dead_letters.push(message.body);
            return false;
        }

        let delay = self.backoff.delay(message.attempts);
        message.visible_at = Instant::now() + delay;
        tracing::debug!(
            receipt,
            attempts = message.attempts,
            delay_ms = delay.as_millis() as u64,
            "Operation released for redelivery"
        );
        state.ready.push_back(message);
        true
    }

    /// Messages waiting or in flight.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.in_flight.len()
    }

    pub async fn dead_letters(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Wait until a message is sent or `timeout` elapses.
    pub async fn wait_for_message(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

/// Where intake sends operations.
#[derive(Clone)]
pub enum OperationQueue {
    CloudTasks {
        tasks: Arc<TasksService>,
        /// Base URL Cloud Tasks calls back into.
        service_url: String,
    },
    Local(Arc<LocalQueue>),
}

impl OperationQueue {
    pub async fn enqueue(&self, operation: &Operation) -> Result<()> {
        match self {
            OperationQueue::CloudTasks {
                tasks,
                service_url,
            } => tasks.queue_operation(service_url, operation).await,
            OperationQueue::Local(queue) => {
                let body = serde_json::to_vec(operation)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;
                queue.send(body).await;
                Ok(())
            }
        }
    }
}
