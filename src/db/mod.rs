// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscriber store.
//!
//! Records are keyed by subscriber id with two secondary lookup paths:
//! normalized email (backed by an email-claim index that doubles as the
//! create-if-absent guard) and status. Firestore is the production backend;
//! the memory backend serves local development and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{Operation, Subscriber, SubscriberEmail, SubscriberStatus, Transition};
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const SUBSCRIBERS: &str = "newsletter_subscribers";
    /// Email claims (keyed by URL-encoded normalized email)
    pub const EMAIL_CLAIMS: &str = "newsletter_subscriber_emails";
}

/// One page request over the primary key order.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub limit: u32,
    /// Exclusive lower bound on subscriber id.
    pub after_id: Option<String>,
    pub status: Option<SubscriberStatus>,
}

#[derive(Debug, Clone)]
pub struct SubscriberPage {
    pub subscribers: Vec<Subscriber>,
    /// Whether another page follows the last returned record.
    pub has_more: bool,
    /// Number of records matching the status filter across all pages.
    pub total_count: u64,
}

/// Subscriber store handle, cheap to clone.
#[derive(Clone)]
pub enum SubscriberDb {
    Firestore(FirestoreDb),
    Memory(MemoryDb),
}

impl SubscriberDb {
    pub async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>, AppError> {
        match self {
            SubscriberDb::Firestore(db) => db.get_subscriber(id).await,
            SubscriberDb::Memory(db) => db.get_subscriber(id).await,
        }
    }

    /// Look a subscriber up through the email index.
    pub async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, AppError> {
        match self {
            SubscriberDb::Firestore(db) => db.find_by_email(email).await,
            SubscriberDb::Memory(db) => db.find_by_email(email).await,
        }
    }

    /// Fetch one page ordered by id.
    ///
    /// One extra record is requested to learn whether another page exists.
    pub async fn list_subscribers(&self, query: &ListQuery) -> Result<SubscriberPage, AppError> {
        let limit = query.limit.max(1);
        let fetch_limit = limit.saturating_add(1);

        let (mut subscribers, total_count) = match self {
            SubscriberDb::Firestore(db) => db.list_subscribers(query, fetch_limit).await?,
            SubscriberDb::Memory(db) => db.list_subscribers(query, fetch_limit).await?,
        };

        let has_more = subscribers.len() > limit as usize;
        if has_more {
            subscribers.truncate(limit as usize);
        }

        Ok(SubscriberPage {
            subscribers,
            has_more,
            total_count,
        })
    }

    /// Every record in the store (used for aggregate stats).
    pub async fn all_subscribers(&self) -> Result<Vec<Subscriber>, AppError> {
        match self {
            SubscriberDb::Firestore(db) => db.all_subscribers().await,
            SubscriberDb::Memory(db) => db.all_subscribers().await,
        }
    }

    /// Apply one queued operation as a single read-modify-write.
    pub async fn apply_operation(
        &self,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> Result<Transition, AppError> {
        match self {
            SubscriberDb::Firestore(db) => db.apply_operation(operation, now).await,
            SubscriberDb::Memory(db) => db.apply_operation(operation, now).await,
        }
    }

    /// Change a subscriber's email. Returns `None` if the id is unknown.
    pub async fn update_email(
        &self,
        id: &str,
        email: &SubscriberEmail,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, AppError> {
        match self {
            SubscriberDb::Firestore(db) => db.update_email(id, email, now).await,
            SubscriberDb::Memory(db) => db.update_email(id, email, now).await,
        }
    }

    /// Permanently remove a subscriber. Returns `false` if the id is unknown.
    pub async fn purge_subscriber(&self, id: &str) -> Result<bool, AppError> {
        match self {
            SubscriberDb::Firestore(db) => db.purge_subscriber(id).await,
            SubscriberDb::Memory(db) => db.purge_subscriber(id).await,
        }
    }
}

impl From<FirestoreDb> for SubscriberDb {
    fn from(db: FirestoreDb) -> Self {
        SubscriberDb::Firestore(db)
    }
}

impl From<MemoryDb> for SubscriberDb {
    fn from(db: MemoryDb) -> Self {
        SubscriberDb::Memory(db)
    }
}

/// Generate an id for a new subscriber record.
pub fn new_subscriber_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
