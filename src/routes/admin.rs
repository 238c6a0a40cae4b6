// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin API routes (require `X-Api-Key`).

use crate::error::Result;
use crate::middleware::admin_auth::AdminCaller;
use crate::models::{SubscriberStats, SubscriberView};
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/newsletter/admin/subscribers", get(list_subscribers))
        .route(
            "/v1/newsletter/admin/subscribers/{id}",
            get(get_subscriber)
                .patch(update_subscriber)
                .delete(delete_subscriber),
        )
        .route("/v1/newsletter/admin/stats", get(get_stats))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriberListResponse {
    pub subscribers: Vec<SubscriberView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn list_subscribers(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<SubscriberListResponse>> {
    let Query(params) = params?;
    let list = state
        .admin()
        .list(
            params.limit,
            params.cursor.as_deref(),
            params.status.as_deref(),
        )
        .await?;

    Ok(Json(SubscriberListResponse {
        subscribers: list.subscribers.into_iter().map(Into::into).collect(),
        next_cursor: list.next_cursor,
        total_count: list.total_count,
    }))
}

async fn get_subscriber(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SubscriberView>> {
    Ok(Json(state.admin().get(&id).await?.into()))
}

async fn update_subscriber(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AdminCaller>,
    Path(id): Path<String>,
    body: std::result::Result<Json<UpdateEmailRequest>, JsonRejection>,
) -> Result<Json<SubscriberView>> {
    let Json(body) = body?;
    tracing::info!(
        subscriber_id = %id,
        ip = %caller.client.ip_address,
        "Admin email change"
    );
    Ok(Json(state.admin().update_email(&id, &body.email).await?.into()))
}

async fn delete_subscriber(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AdminCaller>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    tracing::info!(
        subscriber_id = %id,
        ip = %caller.client.ip_address,
        "Admin delete"
    );
    state.admin().delete(&id).await?;

    Ok(Json(MessageResponse {
        message: format!("Subscriber {} deleted", id),
    }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<SubscriberStats>> {
    Ok(Json(state.admin().stats().await?))
}
