// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! On Cloud Run the admin key is injected as an environment variable via a
//! secret binding, so there is no separate Secret Manager fetch.

use std::env;
use std::str::FromStr;

/// Name of the Cloud Tasks queue carrying subscription operations.
pub const OPERATIONS_QUEUE_NAME: &str = "newsletter-operations";

/// Service account Cloud Tasks signs callback OIDC tokens as.
pub fn tasks_service_account(project_id: &str) -> String {
    format!("newsletter-api@{}.iam.gserviceaccount.com", project_id)
}

/// Where subscriber records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// In-process maps; state is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid("STORE_BACKEND", other.to_string())),
        }
    }
}

/// How operations travel from intake to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Cloud Tasks pushes each message to `/tasks/process-operation`.
    CloudTasks,
    /// In-process queue drained by a background worker.
    Local,
}

impl FromStr for QueueBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cloud-tasks" | "cloud_tasks" | "cloudtasks" => Ok(Self::CloudTasks),
            "local" => Ok(Self::Local),
            other => Err(ConfigError::Invalid("QUEUE_BACKEND", other.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (Cloud Tasks location)
    pub gcp_region: String,
    /// Public base URL of this service, used as the Cloud Tasks target
    pub api_url: String,
    /// Origin allowed to call the public endpoints from a browser
    pub allowed_origin: String,
    pub store_backend: StoreBackend,
    pub queue_backend: QueueBackend,

    /// Shared secret expected in the `X-Api-Key` header on admin routes
    pub admin_api_key: String,
}

impl Config {
    /// Config for tests: memory store, local queue, fixed admin key.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            api_url: "http://localhost:8080".to_string(),
            allowed_origin: "http://localhost:5173".to_string(),
            store_backend: StoreBackend::Memory,
            queue_backend: QueueBackend::Local,
            admin_api_key: "test-admin-key".to_string(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let port = match env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", raw))?,
            Err(_) => 8080,
        };

        let admin_api_key = env::var("ADMIN_API_KEY")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("ADMIN_API_KEY"))?;
        if admin_api_key.is_empty() {
            return Err(ConfigError::Invalid("ADMIN_API_KEY", "<empty>".to_string()));
        }

        Ok(Self {
            port,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            api_url: env::var("API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            allowed_origin: env::var("ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            store_backend: env::var("STORE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(StoreBackend::Firestore))?,
            queue_backend: env::var("QUEUE_BACKEND")
                .map(|v| v.parse())
                .unwrap_or(Ok(QueueBackend::CloudTasks))?,
            admin_api_key,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
