// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operation processor tests: idempotence, lifecycle, failure handling.

use chrono::{DateTime, Duration, Utc};
use newsletter_service::db::MemoryDb;
use newsletter_service::models::{
    Operation, SubscribeIntent, SubscriberEmail, SubscriberStatus, UnsubscribeIntent,
};
use newsletter_service::services::queue::MAX_DELIVERY_ATTEMPTS;
use newsletter_service::services::{Disposition, LocalQueue, OperationProcessor, RetryBackoff};
use std::sync::Arc;
use std::time::Duration as StdDuration;

mod common;

fn subscribe(email: &str, name: Option<&str>) -> Operation {
    Operation::Subscribe(SubscribeIntent {
        email: SubscriberEmail::parse(email).unwrap(),
        name: name.map(String::from),
        ip_address: Some("203.0.113.7".into()),
        user_agent: Some("test".into()),
        received_at: Utc::now(),
    })
}

fn unsubscribe(email: &str) -> Operation {
    Operation::Unsubscribe(UnsubscribeIntent {
        email: SubscriberEmail::parse(email).unwrap(),
        received_at: Utc::now(),
    })
}

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

async fn lookup(db: &MemoryDb, email: &str) -> newsletter_service::models::Subscriber {
    db.find_by_email(&SubscriberEmail::parse(email).unwrap())
        .await
        .unwrap()
        .expect("subscriber should exist")
}

#[tokio::test]
async fn test_same_subscribe_twice_is_idempotent() {
    let db = MemoryDb::new();
    let processor = OperationProcessor::new(db.clone().into());
    let op = subscribe("a@x.com", Some("Alice"));

    processor.apply_at(&op, t0()).await.unwrap();
    let second = t0() + Duration::minutes(5);
    processor.apply_at(&op, second).await.unwrap();

    let all = db.all_subscribers().await.unwrap();
    assert_eq!(all.len(), 1);

    let record = &all[0];
    assert_eq!(record.status, SubscriberStatus::Active);
    assert_eq!(record.subscribed_at, t0());
    assert_eq!(record.updated_at, second);
    assert_eq!(record.name.as_deref(), Some("Alice"));
}

#[tokio::test]
async fn test_active_resubscribe_keeps_stored_name() {
    let db = MemoryDb::new();
    let processor = OperationProcessor::new(db.clone().into());

    processor
        .apply_at(&subscribe("a@x.com", Some("Alice")), t0())
        .await
        .unwrap();
    processor
        .apply_at(
            &subscribe("a@x.com", Some("Mallory")),
            t0() + Duration::minutes(1),
        )
        .await
        .unwrap();

    let record = lookup(&db, "a@x.com").await;
    assert_eq!(record.name.as_deref(), Some("Alice"));
    assert_eq!(record.updated_at, t0() + Duration::minutes(1));
}

#[tokio::test]
async fn test_reactivation_keeps_identity_and_signup_time() {
    let db = MemoryDb::new();
    let processor = OperationProcessor::new(db.clone().into());

    processor
        .apply_at(&subscribe("a@x.com", Some("Alice")), t0())
        .await
        .unwrap();
    let original_id = lookup(&db, "a@x.com").await.id;

    processor
        .apply_at(&unsubscribe("a@x.com"), t0() + Duration::hours(1))
        .await
        .unwrap();
    let inactive = lookup(&db, "a@x.com").await;
    assert_eq!(inactive.status, SubscriberStatus::Inactive);
    assert_eq!(inactive.updated_at, t0() + Duration::hours(1));

    let latest = t0() + Duration::hours(2);
    processor
        .apply_at(&subscribe("A@X.COM", None), latest)
        .await
        .unwrap();

    let record = lookup(&db, "a@x.com").await;
    assert_eq!(record.id, original_id);
    assert_eq!(record.status, SubscriberStatus::Active);
    assert_eq!(record.subscribed_at, t0());
    assert_eq!(record.updated_at, latest);
    // Reactivation without a name keeps the stored one.
    assert_eq!(record.name.as_deref(), Some("Alice"));
    assert_eq!(db.all_subscribers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_delivery_through_queue() {
    let app = common::create_test_app();
    let body = serde_json::to_vec(&subscribe("dup@x.com", None)).unwrap();

    // At-least-once: the same message delivered three times.
    for _ in 0..3 {
        app.queue.send(body.clone()).await;
    }
    let summary = app.drain().await;
    assert_eq!(summary.acked, 3);

    let all = app.memory.all_subscribers().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, SubscriberStatus::Active);
}

#[tokio::test]
async fn test_poison_messages_are_dropped() {
    let db = MemoryDb::new();
    let processor = OperationProcessor::new(db.clone().into());

    let poison: [&[u8]; 4] = [
        b"{",
        br#"{"type":"resubscribe","email":"a@x.com","received_at":"2026-01-01T00:00:00Z"}"#,
        br#"{"type":"subscribe","email":"not-an-email","received_at":"2026-01-01T00:00:00Z"}"#,
        br#"{"type":"unsubscribe"}"#,
    ];
    for body in poison {
        assert_eq!(processor.handle_message(body).await, Disposition::Drop);
    }

    let overlong = "x".repeat(201);
    let body = serde_json::to_vec(&subscribe("a@x.com", Some(overlong.as_str()))).unwrap();
    assert_eq!(processor.handle_message(&body).await, Disposition::Drop);

    assert!(db.all_subscribers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_outage_leaves_message_for_redelivery() {
    let app = common::create_test_app();
    app.subscribe("a@x.com", None).await;

    app.memory.set_unavailable(true);
    let summary = app.drain().await;
    assert_eq!(summary.retried, 1);
    assert_eq!(app.queue.pending().await, 1);

    app.memory.set_unavailable(false);
    let summary = app.drain().await;
    assert_eq!(summary.acked, 1);

    let (_, body) = app.status("a@x.com").await;
    assert_eq!(body["status"], "active");
}

#[tokio::test]
async fn test_persistent_outage_dead_letters_message() {
    let app = common::create_test_app();
    app.subscribe("a@x.com", None).await;

    app.memory.set_unavailable(true);
    for _ in 0..MAX_DELIVERY_ATTEMPTS {
        app.drain().await;
    }

    assert_eq!(app.queue.pending().await, 0);
    assert_eq!(app.queue.dead_letters().await.len(), 1);
}

#[tokio::test]
async fn test_worker_rides_out_short_outage() {
    let memory = MemoryDb::new();
    // Redeliveries at roughly 0.25s, 0.75s, 1.75s and 3.75s after the first try.
    let queue = Arc::new(LocalQueue::with_backoff(RetryBackoff {
        min: StdDuration::from_millis(250),
        max: StdDuration::from_secs(4),
    }));

    memory.set_unavailable(true);
    queue
        .send(serde_json::to_vec(&subscribe("a@x.com", None)).unwrap())
        .await;
    let worker = tokio::spawn(
        OperationProcessor::new(memory.clone().into()).run_local_worker(queue.clone()),
    );

    tokio::time::sleep(StdDuration::from_secs(2)).await;
    memory.set_unavailable(false);

    let email = SubscriberEmail::parse("a@x.com").unwrap();
    let mut found = None;
    for _ in 0..40 {
        found = memory.find_by_email(&email).await.unwrap();
        if found.is_some() && queue.pending().await == 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(200)).await;
    }
    worker.abort();

    assert!(found.is_some(), "subscribe should land once the store recovers");
    assert!(queue.dead_letters().await.is_empty());
    assert_eq!(queue.pending().await, 0);
}

#[tokio::test]
async fn test_concurrent_first_subscribes_create_one_record() {
    let app = common::create_test_app();
    let body = serde_json::to_vec(&subscribe("race@x.com", None)).unwrap();

    for _ in 0..20 {
        app.queue.send(body.clone()).await;
    }
    app.drain().await;

    assert_eq!(app.memory.all_subscribers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_active_plus_inactive_equals_total() {
    let app = common::create_test_app();

    for i in 0..6 {
        app.subscribe(&format!("user{}@x.com", i), None).await;
    }
    app.drain().await;
    for i in 0..3 {
        app.unsubscribe(&format!("user{}@x.com", i)).await;
    }
    app.unsubscribe("ghost@x.com").await;
    app.drain().await;
    app.subscribe("user0@x.com", None).await;
    app.drain().await;

    let stats = app.state.admin().stats().await.unwrap();
    assert_eq!(stats.total_subscribers, 6);
    assert_eq!(stats.active_subscribers, 4);
    assert_eq!(stats.inactive_subscribers, 2);
    assert_eq!(
        stats.active_subscribers + stats.inactive_subscribers,
        stats.total_subscribers
    );
}
