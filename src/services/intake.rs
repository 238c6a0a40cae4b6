// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public intake: validate, normalize, enqueue.
//!
//! Subscribe and unsubscribe never touch the store directly. A successful
//! return only means the operation was queued; `status` may lag behind until
//! the processor catches up.

use crate::db::SubscriberDb;
use crate::error::{AppError, Result};
use crate::middleware::ClientInfo;
use crate::models::subscriber::parse_name;
use crate::models::{Operation, SubscribeIntent, Subscriber, SubscriberEmail, UnsubscribeIntent};
use crate::services::queue::OperationQueue;
use chrono::Utc;

#[derive(Clone)]
pub struct IntakeService {
    db: SubscriberDb,
    queue: OperationQueue,
}

impl IntakeService {
    pub fn new(db: SubscriberDb, queue: OperationQueue) -> Self {
        Self { db, queue }
    }

    /// Queue a subscribe for `email`.
    pub async fn subscribe(
        &self,
        email: &str,
        name: Option<&str>,
        client: &ClientInfo,
    ) -> Result<SubscriberEmail> {
        let email = SubscriberEmail::parse(email).map_err(AppError::BadRequest)?;
        let name = parse_name(name).map_err(AppError::BadRequest)?;

        let operation = Operation::Subscribe(SubscribeIntent {
            email: email.clone(),
            name,
            ip_address: Some(client.ip_address.clone()),
            user_agent: Some(client.user_agent.clone()),
            received_at: Utc::now(),
        });
        self.queue.enqueue(&operation).await?;

        tracing::info!(email = %email, ip = %client.ip_address, "Subscribe queued");
        Ok(email)
    }

    /// Queue an unsubscribe for `email`.
    pub async fn unsubscribe(&self, email: &str) -> Result<SubscriberEmail> {
        let email = SubscriberEmail::parse(email).map_err(AppError::BadRequest)?;

        let operation = Operation::Unsubscribe(UnsubscribeIntent {
            email: email.clone(),
            received_at: Utc::now(),
        });
        self.queue.enqueue(&operation).await?;

        tracing::info!(email = %email, "Unsubscribe queued");
        Ok(email)
    }

    /// Current persisted record for `email`, if any.
    pub async fn status(&self, email: &str) -> Result<(SubscriberEmail, Option<Subscriber>)> {
        let email = SubscriberEmail::parse(email).map_err(AppError::BadRequest)?;
        let record = self.db.find_by_email(&email).await?;
        Ok((email, record))
    }
}
