// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Public newsletter endpoints (signup form).

use crate::error::Result;
use crate::middleware::ClientInfo;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/newsletter", post(subscribe).delete(unsubscribe))
        .route("/v1/newsletter/status", get(status))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Status answer; only `email` and `status` are set for unknown emails.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub email: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    body: std::result::Result<Json<SubscribeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let Json(body) = body?;
    state
        .intake()
        .subscribe(&body.email, body.name.as_deref(), &client)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Subscription request received".to_string(),
        }),
    ))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let Json(body) = body?;
    state.intake().unsubscribe(&body.email).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Unsubscribe request received".to_string(),
        }),
    ))
}

async fn status(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>> {
    let Query(query) = query?;
    let (email, record) = state.intake().status(&query.email).await?;

    let response = match record {
        Some(s) => StatusResponse {
            email: s.email,
            status: s.status.as_str(),
            name: s.name,
            subscribed_at: Some(format_utc_rfc3339(s.subscribed_at)),
            updated_at: Some(format_utc_rfc3339(s.updated_at)),
        },
        None => StatusResponse {
            email: email.to_string(),
            status: "not_found",
            name: None,
            subscribed_at: None,
            updated_at: None,
        },
    };

    Ok(Json(response))
}
