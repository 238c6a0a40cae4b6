// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod admin;
pub mod google_oidc;
pub mod intake;
pub mod processor;
pub mod queue;
pub mod tasks;

pub use admin::AdminService;
pub use google_oidc::TaskTokenVerifier;
pub use intake::IntakeService;
pub use processor::{Disposition, OperationProcessor};
pub use queue::{LocalQueue, OperationQueue, RetryBackoff};
pub use tasks::TasksService;
