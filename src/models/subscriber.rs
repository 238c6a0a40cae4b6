// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscriber record and its validated field types.

use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

/// Longest display name accepted at intake.
pub const MAX_NAME_CHARS: usize = 200;

/// A syntactically valid, normalized (trimmed + lower-cased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim().to_lowercase();

        if normalized.is_empty() {
            return Err("email is required".to_string());
        }

        if !normalized.validate_email() {
            return Err(format!("{} is not a valid email address", raw.trim()));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubscriberEmail {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SubscriberEmail> for String {
    fn from(email: SubscriberEmail) -> Self {
        email.0
    }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriberEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Clean up an optional display name.
///
/// Blank names are treated as absent.
pub fn parse_name(raw: Option<&str>) -> Result<Option<String>, String> {
    let Some(name) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if name.chars().count() > MAX_NAME_CHARS {
        return Err(format!("name must be at most {} characters", MAX_NAME_CHARS));
    }

    Ok(Some(name.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Active,
    Inactive,
}

impl SubscriberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberStatus::Active => "active",
            SubscriberStatus::Inactive => "inactive",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriberStatus::Active)
    }
}

/// Subscriber record as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Opaque identifier (also used as document ID)
    pub id: String,
    /// Normalized email address
    pub email: String,
    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,
    pub status: SubscriberStatus,
    /// Set once when the record is first created
    pub subscribed_at: DateTime<Utc>,
    /// Set on every mutation
    pub updated_at: DateTime<Utc>,
    /// IP address of the most recent subscribe request
    #[serde(default)]
    pub ip_address: Option<String>,
    /// User agent of the most recent subscribe request
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Subscriber {
    /// Move `updated_at` forward to `now`, never behind `subscribed_at`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.subscribed_at);
    }
}

/// Subscriber as returned by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberView {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub status: SubscriberStatus,
    pub subscribed_at: String,
    pub updated_at: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl From<Subscriber> for SubscriberView {
    fn from(s: Subscriber) -> Self {
        Self {
            id: s.id,
            email: s.email,
            name: s.name,
            status: s.status,
            subscribed_at: format_utc_rfc3339(s.subscribed_at),
            updated_at: format_utc_rfc3339(s.updated_at),
            ip_address: s.ip_address,
            user_agent: s.user_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let email = SubscriberEmail::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");
    }

    #[test]
    fn email_rejects_garbage() {
        assert!(SubscriberEmail::parse("").is_err());
        assert!(SubscriberEmail::parse("   ").is_err());
        assert!(SubscriberEmail::parse("alice.example.com").is_err());
        assert!(SubscriberEmail::parse("@example.com").is_err());
    }

    #[test]
    fn email_deserialization_validates() {
        let ok: Result<SubscriberEmail, _> = serde_json::from_str("\"B@X.com\"");
        assert_eq!(ok.unwrap().as_str(), "b@x.com");

        let bad: Result<SubscriberEmail, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn blank_name_is_absent() {
        assert_eq!(parse_name(None).unwrap(), None);
        assert_eq!(parse_name(Some("   ")).unwrap(), None);
        assert_eq!(parse_name(Some(" Alice ")).unwrap(), Some("Alice".into()));
    }

    #[test]
    fn overlong_name_is_rejected() {
        let name = "a".repeat(MAX_NAME_CHARS + 1);
        assert!(parse_name(Some(&name)).is_err());

        let name = "a".repeat(MAX_NAME_CHARS);
        assert!(parse_name(Some(&name)).is_ok());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SubscriberStatus::Inactive).unwrap(),
            "\"inactive\""
        );
    }

    #[test]
    fn touch_never_goes_behind_subscribed_at() {
        let subscribed_at = chrono::DateTime::from_timestamp(1_000, 0).unwrap();
        let mut subscriber = Subscriber {
            id: "id".into(),
            email: "a@x.com".into(),
            name: None,
            status: SubscriberStatus::Active,
            subscribed_at,
            updated_at: subscribed_at,
            ip_address: None,
            user_agent: None,
        };

        subscriber.touch(chrono::DateTime::from_timestamp(500, 0).unwrap());
        assert_eq!(subscriber.updated_at, subscribed_at);

        let later = chrono::DateTime::from_timestamp(2_000, 0).unwrap();
        subscriber.touch(later);
        assert_eq!(subscriber.updated_at, later);
    }
}
