// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Newsletter subscription service.
//!
//! Public intake validates subscribe/unsubscribe requests and queues them;
//! the operation processor applies queued operations idempotently to the
//! subscriber store; an API-key-protected admin surface lists, edits and
//! removes subscribers.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SubscriberDb;
use middleware::Authorizer;
use services::{
    AdminService, IntakeService, OperationProcessor, OperationQueue, TaskTokenVerifier,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SubscriberDb,
    pub queue: OperationQueue,
    pub authorizer: Arc<dyn Authorizer>,
    /// Checks the OIDC token on Cloud Tasks callbacks.
    pub task_verifier: Arc<TaskTokenVerifier>,
}

impl AppState {
    pub fn intake(&self) -> IntakeService {
        IntakeService::new(self.db.clone(), self.queue.clone())
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(self.db.clone())
    }

    pub fn processor(&self) -> OperationProcessor {
        OperationProcessor::new(self.db.clone())
    }
}
