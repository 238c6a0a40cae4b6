// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process subscriber store.
//!
//! A single `RwLock` guards both the records and the email index, so every
//! operation is one atomic read-modify-write.

use crate::db::{new_subscriber_id, ListQuery};
use crate::error::AppError;
use crate::models::{Operation, Subscriber, SubscriberEmail, Transition};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    /// Records keyed by id (ordered for cursor pagination)
    records: BTreeMap<String, Subscriber>,
    /// Normalized email -> subscriber id
    emails: HashMap<String, String>,
}

impl Tables {
    fn by_email(&self, email: &str) -> Option<&Subscriber> {
        self.emails
            .get(email)
            .and_then(|id| self.records.get(id))
    }
}

/// Memory-backed store, cheap to clone (clones share state).
#[derive(Clone, Default)]
pub struct MemoryDb {
    tables: Arc<RwLock<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while set, every call fails with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Database(
                "Memory store unavailable (simulated outage)".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>, AppError> {
        self.check_available()?;
        Ok(self.tables.read().await.records.get(id).cloned())
    }

    pub async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, AppError> {
        self.check_available()?;
        Ok(self.tables.read().await.by_email(email.as_str()).cloned())
    }

    pub async fn list_subscribers(
        &self,
        query: &ListQuery,
        fetch_limit: u32,
    ) -> Result<(Vec<Subscriber>, u64), AppError> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let wanted = |s: &&Subscriber| query.status.map_or(true, |status| s.status == status);

        let lower = match query.after_id.as_deref() {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        let page = tables
            .records
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(_, s)| s)
            .filter(wanted)
            .take(fetch_limit as usize)
            .cloned()
            .collect();

        let total = tables.records.values().filter(wanted).count() as u64;

        Ok((page, total))
    }

    pub async fn all_subscribers(&self) -> Result<Vec<Subscriber>, AppError> {
        self.check_available()?;
        Ok(self.tables.read().await.records.values().cloned().collect())
    }

    pub async fn apply_operation(
        &self,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> Result<Transition, AppError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let existing = tables.by_email(operation.email().as_str()).cloned();
        let transition = operation.transition(existing.as_ref(), now, new_subscriber_id);

        if let Some(record) = transition.record() {
            if matches!(transition, Transition::Create(_)) {
                tables
                    .emails
                    .insert(record.email.clone(), record.id.clone());
            }
            tables.records.insert(record.id.clone(), record.clone());
        }

        Ok(transition)
    }

    pub async fn update_email(
        &self,
        id: &str,
        email: &SubscriberEmail,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, AppError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let Some(mut record) = tables.records.get(id).cloned() else {
            return Ok(None);
        };
        let old_email = std::mem::replace(&mut record.email, email.to_string());
        record.touch(now);

        if old_email != record.email {
            if tables.emails.get(&old_email).map(String::as_str) == Some(id) {
                tables.emails.remove(&old_email);
            }
            match tables.emails.get(&record.email) {
                Some(holder) if holder != id => {
                    tracing::warn!(
                        subscriber_id = id,
                        holder = %holder,
                        "New email already belongs to another subscriber"
                    );
                }
                _ => {
                    tables.emails.insert(record.email.clone(), id.to_string());
                }
            }
        }

        tables.records.insert(id.to_string(), record.clone());
        Ok(Some(record))
    }

    pub async fn purge_subscriber(&self, id: &str) -> Result<bool, AppError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let Some(record) = tables.records.remove(id) else {
            return Ok(false);
        };
        if tables.emails.get(&record.email).map(String::as_str) == Some(id) {
            tables.emails.remove(&record.email);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubscribeIntent, SubscriberStatus, UnsubscribeIntent};

    fn email(raw: &str) -> SubscriberEmail {
        SubscriberEmail::parse(raw).unwrap()
    }

    fn subscribe(raw: &str) -> Operation {
        Operation::Subscribe(SubscribeIntent {
            email: email(raw),
            name: None,
            ip_address: None,
            user_agent: None,
            received_at: Utc::now(),
        })
    }

    fn unsubscribe(raw: &str) -> Operation {
        Operation::Unsubscribe(UnsubscribeIntent {
            email: email(raw),
            received_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn concurrent_first_subscribes_create_one_record() {
        let db = MemoryDb::new();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    db.apply_operation(&subscribe("race@x.com"), Utc::now()).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = db.all_subscribers().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, SubscriberStatus::Active);
    }

    #[tokio::test]
    async fn purge_releases_email() {
        let db = MemoryDb::new();
        let first = db
            .apply_operation(&subscribe("a@x.com"), Utc::now())
            .await
            .unwrap();
        let first_id = first.record().unwrap().id.clone();

        assert!(db.purge_subscriber(&first_id).await.unwrap());
        assert!(!db.purge_subscriber(&first_id).await.unwrap());
        assert!(db.find_by_email(&email("a@x.com")).await.unwrap().is_none());

        let second = db
            .apply_operation(&subscribe("a@x.com"), Utc::now())
            .await
            .unwrap();
        assert!(matches!(second, Transition::Create(_)));
        assert_ne!(second.record().unwrap().id, first_id);
    }

    #[tokio::test]
    async fn update_email_moves_index() {
        let db = MemoryDb::new();
        let created = db
            .apply_operation(&subscribe("old@x.com"), Utc::now())
            .await
            .unwrap();
        let id = created.record().unwrap().id.clone();

        let updated = db
            .update_email(&id, &email("New@X.com"), Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, "new@x.com");

        assert!(db.find_by_email(&email("old@x.com")).await.unwrap().is_none());
        let found = db.find_by_email(&email("new@x.com")).await.unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let db = MemoryDb::new();
        db.set_unavailable(true);

        let err = db
            .apply_operation(&unsubscribe("a@x.com"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        db.set_unavailable(false);
        let transition = db
            .apply_operation(&unsubscribe("a@x.com"), Utc::now())
            .await
            .unwrap();
        assert_eq!(transition, Transition::Skip);
    }
}
