// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Queued subscription intents and the lifecycle transitions they drive.
//!
//! The wire format is a JSON object tagged by `type`:
//!
//! ```json
//! {"type": "subscribe", "email": "a@x.com", "name": "Alice",
//!  "ip_address": "203.0.113.7", "user_agent": "curl/8", "received_at": "..."}
//! ```

use super::subscriber::{Subscriber, SubscriberEmail, SubscriberStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A queued instruction to mutate a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    Subscribe(SubscribeIntent),
    Unsubscribe(UnsubscribeIntent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeIntent {
    pub email: SubscriberEmail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribeIntent {
    pub email: SubscriberEmail,
    pub received_at: DateTime<Utc>,
}

/// Outcome of applying an operation to the current record for its email.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// No record existed; insert this one.
    Create(Subscriber),
    /// Inactive record flipped back to active.
    Reactivate(Subscriber),
    /// Active record re-subscribed; only timestamps and provenance change.
    Refresh(Subscriber),
    /// Soft delete.
    Deactivate(Subscriber),
    /// Nothing to do (unsubscribe for an unknown email).
    Skip,
}

impl Transition {
    /// The record to persist, if any.
    pub fn record(&self) -> Option<&Subscriber> {
        match self {
            Transition::Create(s)
            | Transition::Reactivate(s)
            | Transition::Refresh(s)
            | Transition::Deactivate(s) => Some(s),
            Transition::Skip => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Transition::Create(_) => "created",
            Transition::Reactivate(_) => "reactivated",
            Transition::Refresh(_) => "refreshed",
            Transition::Deactivate(_) => "deactivated",
            Transition::Skip => "skipped",
        }
    }
}

impl Operation {
    pub fn email(&self) -> &SubscriberEmail {
        match self {
            Operation::Subscribe(intent) => &intent.email,
            Operation::Unsubscribe(intent) => &intent.email,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Subscribe(_) => "subscribe",
            Operation::Unsubscribe(_) => "unsubscribe",
        }
    }

    /// Compute the next state for the record currently stored under this
    /// operation's email.
    ///
    /// `new_id` is only called when a record has to be created.
    pub fn transition(
        &self,
        existing: Option<&Subscriber>,
        now: DateTime<Utc>,
        new_id: impl FnOnce() -> String,
    ) -> Transition {
        match (self, existing) {
            (Operation::Subscribe(intent), None) => Transition::Create(Subscriber {
                id: new_id(),
                email: intent.email.to_string(),
                name: intent.name.clone(),
                status: SubscriberStatus::Active,
                subscribed_at: now,
                updated_at: now,
                ip_address: intent.ip_address.clone(),
                user_agent: intent.user_agent.clone(),
            }),
            (Operation::Subscribe(intent), Some(current)) => {
                let mut next = current.clone();
                let was_active = next.status.is_active();

                next.status = SubscriberStatus::Active;
                next.touch(now);
                // An active record keeps its name; reactivation takes a new one.
                if !was_active && intent.name.is_some() {
                    next.name = intent.name.clone();
                }
                next.ip_address = intent.ip_address.clone();
                next.user_agent = intent.user_agent.clone();

                if was_active {
                    Transition::Refresh(next)
                } else {
                    Transition::Reactivate(next)
                }
            }
            (Operation::Unsubscribe(_), Some(current)) => {
                let mut next = current.clone();
                next.status = SubscriberStatus::Inactive;
                next.touch(now);
                Transition::Deactivate(next)
            }
            (Operation::Unsubscribe(_), None) => Transition::Skip,
        }
    }
}
