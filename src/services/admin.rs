// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin operations over subscriber records.
//!
//! Callers are authorized by middleware before reaching this service.

use crate::db::{ListQuery, SubscriberDb};
use crate::error::{AppError, Result};
use crate::models::{Subscriber, SubscriberEmail, SubscriberStats, SubscriberStatus};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 100;

/// Clamp a requested page size into `1..=MAX_LIST_LIMIT`.
pub fn clamp_limit(requested: Option<i64>) -> u32 {
    match requested {
        None => DEFAULT_LIST_LIMIT,
        Some(n) => n.clamp(1, MAX_LIST_LIMIT as i64) as u32,
    }
}

/// Cursor = URL-safe base64 of the last returned subscriber id.
pub fn encode_cursor(last_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_id.as_bytes())
}

fn parse_cursor(cursor: Option<&str>) -> Result<Option<String>> {
    cursor
        .filter(|raw| !raw.is_empty())
        .map(|raw| {
            let invalid_cursor = || AppError::BadRequest("Invalid 'cursor' parameter".to_string());

            let decoded = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid_cursor())?;
            let id = String::from_utf8(decoded).map_err(|_| invalid_cursor())?;
            if id.is_empty() {
                return Err(invalid_cursor());
            }
            Ok(id)
        })
        .transpose()
}

fn parse_status_filter(status: Option<&str>) -> Result<Option<SubscriberStatus>> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("active") => Ok(Some(SubscriberStatus::Active)),
        Some(s) if s.eq_ignore_ascii_case("inactive") => Ok(Some(SubscriberStatus::Inactive)),
        Some(other) => Err(AppError::BadRequest(format!(
            "Invalid 'status' parameter: {}",
            other
        ))),
    }
}

/// One page of the admin listing.
#[derive(Debug, Clone)]
pub struct SubscriberList {
    pub subscribers: Vec<Subscriber>,
    pub next_cursor: Option<String>,
    pub total_count: u64,
}

#[derive(Clone)]
pub struct AdminService {
    db: SubscriberDb,
}

impl AdminService {
    pub fn new(db: SubscriberDb) -> Self {
        Self { db }
    }

    pub async fn list(
        &self,
        limit: Option<i64>,
        cursor: Option<&str>,
        status: Option<&str>,
    ) -> Result<SubscriberList> {
        let query = ListQuery {
            limit: clamp_limit(limit),
            after_id: parse_cursor(cursor)?,
            status: parse_status_filter(status)?,
        };

        tracing::debug!(
            limit = query.limit,
            after = ?query.after_id,
            status = ?query.status,
            "Listing subscribers"
        );

        let page = self.db.list_subscribers(&query).await?;

        let next_cursor = if page.has_more {
            page.subscribers.last().map(|s| encode_cursor(&s.id))
        } else {
            None
        };

        Ok(SubscriberList {
            subscribers: page.subscribers,
            next_cursor,
            total_count: page.total_count,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Subscriber> {
        self.db
            .get_subscriber(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscriber {}", id)))
    }

    /// Change a subscriber's email without touching status or signup time.
    pub async fn update_email(&self, id: &str, email: &str) -> Result<Subscriber> {
        let email = SubscriberEmail::parse(email).map_err(AppError::BadRequest)?;

        let updated = self
            .db
            .update_email(id, &email, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscriber {}", id)))?;

        tracing::info!(subscriber_id = id, email = %email, "Subscriber email updated");
        Ok(updated)
    }

    /// Hard delete.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.db.purge_subscriber(id).await? {
            return Err(AppError::NotFound(format!("Subscriber {}", id)));
        }
        tracing::info!(subscriber_id = id, "Subscriber deleted");
        Ok(())
    }

    pub async fn stats(&self) -> Result<SubscriberStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<SubscriberStats> {
        let records = self.db.all_subscribers().await?;
        Ok(SubscriberStats::from_records(&records, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(25)), 25);
        assert_eq!(clamp_limit(Some(1000)), 100);
    }

    #[test]
    fn cursor_round_trips_and_rejects_garbage() {
        let cursor = encode_cursor("2b7e1516-28ae-4d2a-abf7-158809cf4f3c");
        assert_eq!(
            parse_cursor(Some(&cursor)).unwrap().as_deref(),
            Some("2b7e1516-28ae-4d2a-abf7-158809cf4f3c")
        );
        assert_eq!(parse_cursor(None).unwrap(), None);
        assert_eq!(parse_cursor(Some("")).unwrap(), None);

        assert!(matches!(
            parse_cursor(Some("not base64!")),
            Err(AppError::BadRequest(_))
        ));
        // Valid base64, invalid UTF-8.
        let bad_utf8 = URL_SAFE_NO_PAD.encode([0xff, 0xfe]);
        assert!(matches!(
            parse_cursor(Some(&bad_utf8)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn status_filter_parses() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("Active")).unwrap(),
            Some(SubscriberStatus::Active)
        );
        assert_eq!(
            parse_status_filter(Some("inactive")).unwrap(),
            Some(SubscriberStatus::Inactive)
        );
        assert!(parse_status_filter(Some("pending")).is_err());
    }
}
