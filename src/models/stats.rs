// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregate subscriber counts for the admin dashboard.

use super::subscriber::Subscriber;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Window for counting recent signups.
pub const RECENT_SIGNUP_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    pub total_subscribers: u64,
    pub active_subscribers: u64,
    pub inactive_subscribers: u64,
    pub recent_signups_24h: u64,
}

impl SubscriberStats {
    /// Fold a full scan of the store into counts as of `now`.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a Subscriber>,
        now: DateTime<Utc>,
    ) -> Self {
        let cutoff = now - Duration::hours(RECENT_SIGNUP_WINDOW_HOURS);

        records
            .into_iter()
            .fold(SubscriberStats::default(), |mut stats, subscriber| {
                stats.total_subscribers += 1;
                if subscriber.status.is_active() {
                    stats.active_subscribers += 1;
                } else {
                    stats.inactive_subscribers += 1;
                }
                if subscriber.subscribed_at >= cutoff && subscriber.subscribed_at <= now {
                    stats.recent_signups_24h += 1;
                }
                stats
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubscriberStatus;

    fn record(id: &str, status: SubscriberStatus, subscribed_at: DateTime<Utc>) -> Subscriber {
        Subscriber {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: None,
            status,
            subscribed_at,
            updated_at: subscribed_at,
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn empty_store_has_zero_counts() {
        let stats = SubscriberStats::from_records(&Vec::<Subscriber>::new(), Utc::now());
        assert_eq!(stats, SubscriberStats::default());
    }

    #[test]
    fn counts_status_and_recent_window() {
        let now = Utc::now();
        let records = vec![
            record("a", SubscriberStatus::Active, now - Duration::hours(1)),
            record("b", SubscriberStatus::Inactive, now - Duration::hours(23)),
            record("c", SubscriberStatus::Active, now - Duration::hours(25)),
            record("d", SubscriberStatus::Inactive, now - Duration::days(30)),
        ];

        let stats = SubscriberStats::from_records(&records, now);

        assert_eq!(stats.total_subscribers, 4);
        assert_eq!(stats.active_subscribers, 2);
        assert_eq!(stats.inactive_subscribers, 2);
        assert_eq!(stats.recent_signups_24h, 2);
        assert_eq!(
            stats.active_subscribers + stats.inactive_subscribers,
            stats.total_subscribers
        );
    }
}
