// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by Cloud Tasks, not directly by users.
//! The queue-name header check runs as a route layer.

use crate::services::Disposition;
use crate::AppState;
use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/process-operation", post(process_operation))
}

/// Apply one queued operation.
///
/// The raw body is taken so a malformed payload reaches the processor and is
/// dropped with a 200 instead of being retried forever on a 4xx/5xx.
async fn process_operation(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    match state.processor().handle_message(&body).await {
        Disposition::Ack | Disposition::Drop => StatusCode::OK,
        // Return 500 to trigger Cloud Tasks retry
        Disposition::Retry => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
