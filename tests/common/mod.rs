// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use newsletter_service::config::{tasks_service_account, Config};
use newsletter_service::db::{FirestoreDb, MemoryDb};
use newsletter_service::middleware::SharedSecretAuthorizer;
use newsletter_service::routes::create_router;
use newsletter_service::services::processor::DrainSummary;
use newsletter_service::services::{
    LocalQueue, OperationProcessor, OperationQueue, RetryBackoff, TaskTokenVerifier,
};
use newsletter_service::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Key id the test task verifier trusts.
pub const TASKS_TEST_KID: &str = "tasks-test-key";

const TASKS_TEST_PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/tasks_oidc_test_key.pem");
const TASKS_TEST_PUBLIC_KEY: &[u8] = include_bytes!("../fixtures/tasks_oidc_test_key.pub.pem");

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Router plus handles on the in-process backends behind it.
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub queue: Arc<LocalQueue>,
    pub memory: MemoryDb,
}

#[allow(dead_code)]
impl TestApp {
    /// Run the processor over everything queued so far.
    pub async fn drain(&self) -> DrainSummary {
        OperationProcessor::new(self.state.db.clone())
            .drain(&self.queue)
            .await
    }

    /// Send a request and decode the JSON response body (Null if empty).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn subscribe(&self, email: &str, name: Option<&str>) -> StatusCode {
        let mut body = serde_json::json!({ "email": email });
        if let Some(name) = name {
            body["name"] = Value::from(name);
        }
        self.send(json_request("POST", "/v1/newsletter", &body)).await.0
    }

    pub async fn unsubscribe(&self, email: &str) -> StatusCode {
        let body = serde_json::json!({ "email": email });
        self.send(json_request("DELETE", "/v1/newsletter", &body)).await.0
    }

    pub async fn status(&self, email: &str) -> (StatusCode, Value) {
        let uri = format!(
            "/v1/newsletter/status?email={}",
            urlencoding::encode(email)
        );
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }
}

/// Create a test app on the memory store and local queue.
///
/// No background worker runs; call `drain()` to process queued operations.
/// Released messages are redelivered on the next drain.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let config = Config::test_default();
    let memory = MemoryDb::new();
    let queue = Arc::new(LocalQueue::with_backoff(RetryBackoff::NONE));

    let state = Arc::new(AppState {
        authorizer: Arc::new(SharedSecretAuthorizer::new(config.admin_api_key.clone())),
        task_verifier: Arc::new(TaskTokenVerifier::with_static_key(
            &config,
            TASKS_TEST_KID,
            DecodingKey::from_rsa_pem(TASKS_TEST_PUBLIC_KEY).unwrap(),
        )),
        config,
        db: memory.clone().into(),
        queue: OperationQueue::Local(queue.clone()),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        queue,
        memory,
    }
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .header("user-agent", "integration-test")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Admin request carrying the test key.
#[allow(dead_code)]
pub fn admin_request(method: &str, uri: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", ADMIN_KEY);

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Sign a Cloud Tasks style OIDC token as `email` for this service.
#[allow(dead_code)]
pub fn create_test_tasks_token_as(config: &Config, email: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "iss": "https://accounts.google.com",
        "aud": config.api_url.trim_end_matches('/'),
        "sub": "110000000000000000001",
        "email": email,
        "email_verified": true,
        "iat": now,
        "exp": now + 300,
    });

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TASKS_TEST_KID.to_string());
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(TASKS_TEST_PRIVATE_KEY).unwrap(),
    )
    .unwrap()
}

/// Sign a token as the service account Cloud Tasks uses.
#[allow(dead_code)]
pub fn create_test_tasks_token(config: &Config) -> String {
    create_test_tasks_token_as(config, &tasks_service_account(&config.gcp_project_id))
}
