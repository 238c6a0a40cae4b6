// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (admin authentication, task origin, security headers).

pub mod admin_auth;
pub mod client;
pub mod security;
pub mod tasks_auth;

pub use admin_auth::{require_admin_key, Authorizer, SharedSecretAuthorizer};
pub use client::ClientInfo;
pub use tasks_auth::require_tasks_auth;
