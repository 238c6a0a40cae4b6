// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin API key authentication middleware.

use crate::error::AppError;
use crate::middleware::client::ClientInfo;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the admin credential.
pub const ADMIN_KEY_HEADER: &str = "x-api-key";

/// Decides whether a presented credential grants admin access.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, provided_key: Option<&str>) -> bool;
}

/// Compares the presented key against one shared secret.
pub struct SharedSecretAuthorizer {
    secret: String,
}

impl SharedSecretAuthorizer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Authorizer for SharedSecretAuthorizer {
    fn authorize(&self, provided_key: Option<&str>) -> bool {
        match provided_key {
            // An empty configured secret never matches.
            Some(key) if !self.secret.is_empty() => {
                key.as_bytes().ct_eq(self.secret.as_bytes()).into()
            }
            _ => false,
        }
    }
}

/// Marker inserted into request extensions once the caller is authorized.
#[derive(Debug, Clone)]
pub struct AdminCaller {
    pub client: ClientInfo,
}

/// Middleware that requires a valid admin key on every request.
pub async fn require_admin_key(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = ClientInfo::from_headers(request.headers());
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    if !state.authorizer.authorize(provided) {
        tracing::warn!(
            ip = %client.ip_address,
            user_agent = %client.user_agent,
            method = %request.method(),
            path = %request.uri().path(),
            key_present = provided.is_some(),
            "Rejected admin request"
        );
        return Err(AppError::Unauthorized);
    }

    tracing::info!(
        ip = %client.ip_address,
        user_agent = %client.user_agent,
        method = %request.method(),
        path = %request.uri().path(),
        "Admin request authorized"
    );

    request.extensions_mut().insert(AdminCaller { client });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_matches_exactly() {
        let authorizer = SharedSecretAuthorizer::new("s3cret");

        assert!(authorizer.authorize(Some("s3cret")));
        assert!(!authorizer.authorize(Some("wrong-key")));
        assert!(!authorizer.authorize(Some("s3cret ")));
        assert!(!authorizer.authorize(Some("")));
        assert!(!authorizer.authorize(None));
    }

    #[test]
    fn empty_secret_rejects_everything() {
        let authorizer = SharedSecretAuthorizer::new("");
        assert!(!authorizer.authorize(Some("")));
        assert!(!authorizer.authorize(None));
    }
}
