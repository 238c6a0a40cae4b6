// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Verification of the Google-signed OIDC tokens that Cloud Tasks attaches
//! to each push delivery.
//!
//! A token is accepted only if it is RS256-signed by a current Google key,
//! issued by Google, addressed to this service's URL, and names the service
//! account that `TasksService` asks Cloud Tasks to sign as.

use crate::config::{tasks_service_account, Config};
use anyhow::Context;
use axum::http::HeaderValue;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Why a tasks request was not let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Missing, malformed, expired, or issued for someone else.
    Rejected(String),
    /// Google's signing keys could not be fetched; Cloud Tasks should retry.
    Unavailable(String),
}

/// Identity carried by an accepted token.
#[derive(Debug, Clone)]
pub struct TaskCaller {
    pub email: String,
    pub subject: String,
}

struct SigningKeys {
    by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

enum KeySource {
    /// Google's published JWKS, cached for its `max-age`.
    Google {
        http: reqwest::Client,
        cache: RwLock<Option<SigningKeys>>,
        refresh_lock: Mutex<()>,
    },
    /// One fixed key (local runs and tests).
    Static { kid: String, key: Arc<DecodingKey> },
}

/// Checks `Authorization: Bearer` tokens on `/tasks/*` requests.
pub struct TaskTokenVerifier {
    audience: String,
    service_account: String,
    keys: KeySource,
}

impl TaskTokenVerifier {
    /// Verifier backed by Google's signing keys.
    pub fn google(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building JWKS HTTP client")?;

        let verifier = Self::with_keys(
            config,
            KeySource::Google {
                http,
                cache: RwLock::new(None),
                refresh_lock: Mutex::new(()),
            },
        );

        tracing::info!(
            audience = %verifier.audience,
            service_account = %verifier.service_account,
            "Cloud Tasks token verifier initialized"
        );
        Ok(verifier)
    }

    /// Verifier that trusts a single key id.
    pub fn with_static_key(config: &Config, kid: impl Into<String>, key: DecodingKey) -> Self {
        Self::with_keys(
            config,
            KeySource::Static {
                kid: kid.into(),
                key: Arc::new(key),
            },
        )
    }

    fn with_keys(config: &Config, keys: KeySource) -> Self {
        Self {
            audience: config.api_url.trim_end_matches('/').to_string(),
            service_account: tasks_service_account(&config.gcp_project_id),
            keys,
        }
    }

    /// Verify the bearer token in an `Authorization` header value.
    pub async fn verify(
        &self,
        authorization: Option<&HeaderValue>,
    ) -> Result<TaskCaller, TokenError> {
        let token = bearer_token(authorization)?;

        let header = decode_header(token)
            .map_err(|e| TokenError::Rejected(format!("invalid JWT header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::Rejected(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| TokenError::Rejected("missing JWT kid".to_string()))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.audience.as_str()]);
        validation.validate_nbf = true;
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| TokenError::Rejected(format!("JWT validation failed: {e}")))?
            .claims;

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        match claims.iat {
            Some(iat) if iat <= now + CLOCK_SKEW_SECS => {}
            Some(_) => return Err(TokenError::Rejected("iat is in the future".to_string())),
            None => return Err(TokenError::Rejected("missing iat claim".to_string())),
        }

        let email = claims
            .email
            .ok_or_else(|| TokenError::Rejected("missing email claim".to_string()))?;
        if email != self.service_account {
            return Err(TokenError::Rejected(format!(
                "unexpected service account: {email}"
            )));
        }
        if claims.email_verified != Some(true) {
            return Err(TokenError::Rejected("email is not verified".to_string()));
        }

        Ok(TaskCaller {
            email,
            subject: claims.sub,
        })
    }

    async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, TokenError> {
        let (http, cache, refresh_lock) = match &self.keys {
            KeySource::Static {
                kid: trusted,
                key,
            } => {
                return if kid == trusted {
                    Ok(key.clone())
                } else {
                    Err(TokenError::Rejected(format!("unknown JWT kid: {kid}")))
                };
            }
            KeySource::Google {
                http,
                cache,
                refresh_lock,
            } => (http, cache, refresh_lock),
        };

        if let Some(key) = cached_key(cache, kid).await {
            return Ok(key);
        }

        let _guard = refresh_lock.lock().await;
        // Someone else may have refreshed while we waited.
        if let Some(key) = cached_key(cache, kid).await {
            return Ok(key);
        }

        let fresh = fetch_google_keys(http).await?;
        let key = fresh.by_kid.get(kid).cloned();
        *cache.write().await = Some(fresh);

        key.ok_or_else(|| TokenError::Rejected(format!("JWT kid not in Google JWKS: {kid}")))
    }
}

async fn cached_key(cache: &RwLock<Option<SigningKeys>>, kid: &str) -> Option<Arc<DecodingKey>> {
    let cache = cache.read().await;
    cache
        .as_ref()
        .filter(|keys| keys.expires_at > Instant::now())
        .and_then(|keys| keys.by_kid.get(kid))
        .cloned()
}

async fn fetch_google_keys(http: &reqwest::Client) -> Result<SigningKeys, TokenError> {
    let response = http
        .get(GOOGLE_JWKS_URL)
        .send()
        .await
        .map_err(|e| TokenError::Unavailable(format!("JWKS request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(TokenError::Unavailable(format!(
            "JWKS request returned status {}",
            response.status()
        )));
    }

    let ttl = response
        .headers()
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(max_age)
        .unwrap_or(DEFAULT_KEYS_TTL);

    let jwks: Jwks = response
        .json()
        .await
        .map_err(|e| TokenError::Unavailable(format!("invalid JWKS JSON: {e}")))?;

    let mut by_kid = HashMap::new();
    for jwk in jwks.keys {
        if jwk.kty != "RSA" || !matches!(jwk.alg.as_deref(), None | Some("RS256")) {
            continue;
        }
        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => tracing::warn!(error = %e, kid = %jwk.kid, "Skipping unusable JWKS key"),
        }
    }

    if by_kid.is_empty() {
        return Err(TokenError::Unavailable(
            "JWKS response had no usable RSA keys".to_string(),
        ));
    }

    tracing::debug!(keys = by_kid.len(), ttl_secs = ttl.as_secs(), "Google JWKS refreshed");
    Ok(SigningKeys {
        by_kid,
        expires_at: Instant::now() + ttl,
    })
}

#[derive(Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
}

/// Claims checked beyond the ones `Validation` enforces.
#[derive(Deserialize)]
struct IdTokenClaims {
    sub: String,
    iat: Option<u64>,
    email: Option<String>,
    email_verified: Option<bool>,
}

fn bearer_token(authorization: Option<&HeaderValue>) -> Result<&str, TokenError> {
    let value = authorization
        .ok_or_else(|| TokenError::Rejected("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| TokenError::Rejected("invalid Authorization header".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        Some(_) => Err(TokenError::Rejected("empty bearer token".to_string())),
        None => Err(TokenError::Rejected(
            "Authorization header is not a bearer token".to_string(),
        )),
    }
}

/// `max-age` from a Cache-Control header value.
fn max_age(cache_control: &str) -> Option<Duration> {
    cache_control
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim_matches('"').parse().ok())
        .map(Duration::from_secs)
}
