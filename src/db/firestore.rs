// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed subscriber operations.
//!
//! Layout:
//! - `newsletter_subscribers/{id}`: subscriber records
//! - `newsletter_subscriber_emails/{urlencoded email}`: email claims pointing
//!   at the subscriber id that owns each normalized email

use crate::db::{collections, new_subscriber_id, ListQuery};
use crate::error::AppError;
use crate::models::{Operation, Subscriber, SubscriberEmail, Transition};
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreConsistencySelector, FirestoreQueryDirection, FirestoreResult, FirestoreTransaction,
    FirestoreWritePrecondition,
};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Attempts per transactional write before giving up to redelivery.
const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

/// Ownership record for one normalized email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailClaim {
    pub subscriber_id: String,
    pub email: String,
    pub claimed_at: DateTime<Utc>,
}

/// Document ID for an email claim.
fn claim_doc_id(email: &str) -> String {
    urlencoding::encode(email).into_owned()
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    // ─── Reads ───────────────────────────────────────────────────

    /// Get a subscriber by id.
    pub async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>, AppError> {
        read_subscriber(&self.client, id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Resolve an email through its claim document.
    ///
    /// A claim whose record is missing resolves to `None`.
    pub async fn find_by_email(
        &self,
        email: &SubscriberEmail,
    ) -> Result<Option<Subscriber>, AppError> {
        let claim = read_claim(&self.client, email.as_str())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        match claim {
            Some(claim) => self.get_subscriber(&claim.subscriber_id).await,
            None => Ok(None),
        }
    }

    /// Query one page ordered by id, plus the total matching count.
    pub async fn list_subscribers(
        &self,
        query: &ListQuery,
        fetch_limit: u32,
    ) -> Result<(Vec<Subscriber>, u64), AppError> {
        let status = query.status.map(|s| s.as_str());
        let after_id = query.after_id.clone();

        let page: Vec<Subscriber> = self
            .client
            .fluent()
            .select()
            .from(collections::SUBSCRIBERS)
            .filter(move |q| {
                q.for_all([
                    status.and_then(|s| q.field("status").eq(s)),
                    after_id
                        .as_ref()
                        .and_then(|id| q.field("id").greater_than(id.clone())),
                ])
            })
            .order_by([("id", FirestoreQueryDirection::Ascending)])
            .limit(fetch_limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // TODO: switch to a server-side COUNT aggregation once the collection
        // outgrows a full scan per listing request.
        let matching: Vec<Subscriber> = self
            .client
            .fluent()
            .select()
            .from(collections::SUBSCRIBERS)
            .filter(move |q| q.for_all([status.and_then(|s| q.field("status").eq(s))]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((page, matching.len() as u64))
    }

    pub async fn all_subscribers(&self) -> Result<Vec<Subscriber>, AppError> {
        self.client
            .fluent()
            .select()
            .from(collections::SUBSCRIBERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Writes ──────────────────────────────────────────────────
    //
    // Every write path reads the email claim and the record through a
    // transaction-bound client, so a concurrent purge or email change
    // aborts the commit instead of being silently overwritten.

    /// Run a transactional write, retrying when it loses a race.
    ///
    /// Any other failure, or contention that outlasts the retries, surfaces
    /// as `AppError::Database` so the caller (or the queue) tries again later.
    async fn run_write<T, F, Fut>(&self, what: &str, mut attempt_write: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match attempt_write().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < MAX_TRANSACTION_ATTEMPTS && is_contention(&e) => {
                    tracing::debug!(attempt, error = %e, "{} contended, retrying", what);
                    attempt += 1;
                }
                Err(e) => return Err(AppError::Database(format!("{} failed: {}", what, e))),
            }
        }
    }

    /// Apply an operation to the record owning its email.
    ///
    /// The claim and record are read inside the transaction. Creation writes
    /// the claim with an `Exists(false)` precondition; updates write the
    /// record with `Exists(true)` so a record purged mid-flight is never
    /// recreated without its claim.
    pub async fn apply_operation(
        &self,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> Result<Transition, AppError> {
        let transition = self
            .run_write("Subscriber transaction", || {
                self.apply_in_transaction(operation, now)
            })
            .await?;

        if let Transition::Create(record) = &transition {
            tracing::info!(subscriber_id = %record.id, "Subscriber created with email claim");
        }
        Ok(transition)
    }

    async fn apply_in_transaction(
        &self,
        operation: &Operation,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Transition> {
        let mut transaction = self.client.begin_transaction().await?;
        let tx_db = in_transaction(&self.client, &transaction);

        let claim = read_claim(&tx_db, operation.email().as_str()).await?;
        let existing = match &claim {
            Some(claim) => read_subscriber(&tx_db, &claim.subscriber_id).await?,
            None => None,
        };

        let transition = operation.transition(existing.as_ref(), now, new_subscriber_id);

        match &transition {
            Transition::Skip => {
                let _ = transaction.rollback().await;
                return Ok(transition);
            }
            Transition::Create(record) => {
                // A claim whose record is missing is taken over.
                let claim_precondition = if claim.is_some() {
                    FirestoreWritePrecondition::Exists(true)
                } else {
                    FirestoreWritePrecondition::Exists(false)
                };
                let new_claim = EmailClaim {
                    subscriber_id: record.id.clone(),
                    email: record.email.clone(),
                    claimed_at: now,
                };

                self.client
                    .fluent()
                    .update()
                    .in_col(collections::EMAIL_CLAIMS)
                    .precondition(claim_precondition)
                    .document_id(claim_doc_id(&record.email))
                    .object(&new_claim)
                    .add_to_transaction(&mut transaction)?;

                self.client
                    .fluent()
                    .update()
                    .in_col(collections::SUBSCRIBERS)
                    .precondition(FirestoreWritePrecondition::Exists(false))
                    .document_id(&record.id)
                    .object(record)
                    .add_to_transaction(&mut transaction)?;
            }
            Transition::Reactivate(record)
            | Transition::Refresh(record)
            | Transition::Deactivate(record) => {
                self.client
                    .fluent()
                    .update()
                    .in_col(collections::SUBSCRIBERS)
                    .precondition(FirestoreWritePrecondition::Exists(true))
                    .document_id(&record.id)
                    .object(record)
                    .add_to_transaction(&mut transaction)?;
            }
        }

        transaction.commit().await?;
        Ok(transition)
    }

    /// Change a record's email and move its claim in one transaction.
    ///
    /// If another record already holds the new email's claim, the record is
    /// still updated and the claim stays with its holder.
    pub async fn update_email(
        &self,
        id: &str,
        email: &SubscriberEmail,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscriber>, AppError> {
        self.run_write("Email update transaction", || {
            self.update_email_in_transaction(id, email, now)
        })
        .await
    }

    async fn update_email_in_transaction(
        &self,
        id: &str,
        email: &SubscriberEmail,
        now: DateTime<Utc>,
    ) -> FirestoreResult<Option<Subscriber>> {
        let mut transaction = self.client.begin_transaction().await?;
        let tx_db = in_transaction(&self.client, &transaction);

        let Some(mut record) = read_subscriber(&tx_db, id).await? else {
            let _ = transaction.rollback().await;
            return Ok(None);
        };

        let old_email = std::mem::replace(&mut record.email, email.to_string());
        record.touch(now);

        if old_email != record.email {
            let old_claim = read_claim(&tx_db, &old_email).await?;
            let new_claim = read_claim(&tx_db, &record.email).await?;

            if old_claim.is_some_and(|claim| claim.subscriber_id == id) {
                self.client
                    .fluent()
                    .delete()
                    .from(collections::EMAIL_CLAIMS)
                    .document_id(claim_doc_id(&old_email))
                    .add_to_transaction(&mut transaction)?;
            }

            match new_claim {
                Some(holder) if holder.subscriber_id != id => {
                    tracing::warn!(
                        subscriber_id = id,
                        holder = %holder.subscriber_id,
                        "New email already belongs to another subscriber"
                    );
                }
                Some(_) => {}
                None => {
                    let claim = EmailClaim {
                        subscriber_id: id.to_string(),
                        email: record.email.clone(),
                        claimed_at: now,
                    };
                    self.client
                        .fluent()
                        .update()
                        .in_col(collections::EMAIL_CLAIMS)
                        .precondition(FirestoreWritePrecondition::Exists(false))
                        .document_id(claim_doc_id(&record.email))
                        .object(&claim)
                        .add_to_transaction(&mut transaction)?;
                }
            }
        }

        self.client
            .fluent()
            .update()
            .in_col(collections::SUBSCRIBERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&record)
            .add_to_transaction(&mut transaction)?;

        transaction.commit().await?;
        Ok(Some(record))
    }

    /// Delete a record and release its email claim atomically.
    pub async fn purge_subscriber(&self, id: &str) -> Result<bool, AppError> {
        let purged = self
            .run_write("Purge transaction", || self.purge_in_transaction(id))
            .await?;

        if purged {
            tracing::info!(subscriber_id = id, "Subscriber purged");
        }
        Ok(purged)
    }

    async fn purge_in_transaction(&self, id: &str) -> FirestoreResult<bool> {
        let mut transaction = self.client.begin_transaction().await?;
        let tx_db = in_transaction(&self.client, &transaction);

        let Some(record) = read_subscriber(&tx_db, id).await? else {
            let _ = transaction.rollback().await;
            return Ok(false);
        };
        let claim = read_claim(&tx_db, &record.email).await?;

        self.client
            .fluent()
            .delete()
            .from(collections::SUBSCRIBERS)
            .document_id(id)
            .add_to_transaction(&mut transaction)?;

        // Only release a claim that still points at this record.
        if claim.is_some_and(|claim| claim.subscriber_id == id) {
            self.client
                .fluent()
                .delete()
                .from(collections::EMAIL_CLAIMS)
                .document_id(claim_doc_id(&record.email))
                .add_to_transaction(&mut transaction)?;
        }

        transaction.commit().await?;
        Ok(true)
    }
}

// ─── Transaction Helpers ─────────────────────────────────────────

/// A client whose reads join `transaction`, registering the documents for
/// conflict detection at commit.
fn in_transaction(
    client: &firestore::FirestoreDb,
    transaction: &FirestoreTransaction<'_>,
) -> firestore::FirestoreDb {
    client.clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
        transaction.transaction_id().clone(),
    ))
}

async fn read_subscriber(
    client: &firestore::FirestoreDb,
    id: &str,
) -> FirestoreResult<Option<Subscriber>> {
    client
        .fluent()
        .select()
        .by_id_in(collections::SUBSCRIBERS)
        .obj()
        .one(id)
        .await
}

async fn read_claim(
    client: &firestore::FirestoreDb,
    email: &str,
) -> FirestoreResult<Option<EmailClaim>> {
    client
        .fluent()
        .select()
        .by_id_in(collections::EMAIL_CLAIMS)
        .obj()
        .one(&claim_doc_id(email))
        .await
}

/// Whether a failed commit lost a race and is worth re-running.
///
/// Covers a violated precondition (claim already taken, record already
/// gone) and aborted or unavailable commits.
fn is_contention(error: &FirestoreError) -> bool {
    match error {
        FirestoreError::DataConflictError(_) | FirestoreError::DataNotFoundError(_) => true,
        FirestoreError::DatabaseError(e) => e.retry_possible,
        _ => false,
    }
}
