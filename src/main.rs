// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Newsletter Service API Server
//!
//! Accepts newsletter signups, applies them through a queue, and serves the
//! admin API.

use newsletter_service::{
    config::{Config, QueueBackend, StoreBackend},
    db::{FirestoreDb, MemoryDb, SubscriberDb},
    middleware::SharedSecretAuthorizer,
    services::{LocalQueue, OperationProcessor, OperationQueue, TaskTokenVerifier, TasksService},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        store = ?config.store_backend,
        queue = ?config.queue_backend,
        "Starting Newsletter API"
    );

    let db: SubscriberDb = match config.store_backend {
        StoreBackend::Firestore => FirestoreDb::new(&config.gcp_project_id).await?.into(),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; subscribers are lost on restart");
            MemoryDb::new().into()
        }
    };

    let queue = match config.queue_backend {
        QueueBackend::CloudTasks => {
            let tasks = TasksService::new(&config.gcp_project_id, &config.gcp_region);
            tracing::info!(
                project = %config.gcp_project_id,
                "Cloud Tasks service initialized"
            );
            OperationQueue::CloudTasks {
                tasks: Arc::new(tasks),
                service_url: config.api_url.clone(),
            }
        }
        QueueBackend::Local => {
            let local = Arc::new(LocalQueue::new());
            tokio::spawn(OperationProcessor::new(db.clone()).run_local_worker(local.clone()));
            OperationQueue::Local(local)
        }
    };

    let authorizer = Arc::new(SharedSecretAuthorizer::new(config.admin_api_key.clone()));
    let task_verifier = Arc::new(TaskTokenVerifier::google(&config)?);

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        queue,
        authorizer,
        task_verifier,
    });

    // Build router
    let app = newsletter_service::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("newsletter_service=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
