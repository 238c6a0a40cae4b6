// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud Tasks publisher for subscription operations.
//!
//! Each operation becomes one HTTP task targeting
//! `{service_url}/tasks/process-operation`. Cloud Tasks retries the task
//! until the handler answers 2xx, which is what gives the processor
//! at-least-once delivery.
//!
//! Uses the official google-cloud-tasks-v2 SDK.

use crate::config::tasks_service_account;
use crate::error::{AppError, Result};
use crate::models::Operation;
use serde::Serialize;

/// Endpoint Cloud Tasks calls for each queued operation.
pub const PROCESS_OPERATION_PATH: &str = "/tasks/process-operation";

/// Cloud Tasks client wrapper.
pub struct TasksService {
    project_id: String,
    location: String,
    queue_name: String,
}

impl TasksService {
    pub fn new(project_id: &str, region: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            location: region.to_string(),
            queue_name: crate::config::OPERATIONS_QUEUE_NAME.to_string(),
        }
    }

    fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }

    /// Queue a subscribe/unsubscribe operation for processing.
    pub async fn queue_operation(&self, service_url: &str, operation: &Operation) -> Result<()> {
        tracing::debug!(
            operation = operation.kind(),
            email = %operation.email(),
            "Queuing operation in Cloud Tasks"
        );
        self.queue_task(service_url, PROCESS_OPERATION_PATH, operation)
            .await
    }

    /// Generic task queuing helper.
    async fn queue_task<T: Serialize>(
        &self,
        service_url: &str,
        endpoint: &str,
        payload: &T,
    ) -> Result<()> {
        use google_cloud_tasks_v2::client::CloudTasks;
        use google_cloud_tasks_v2::model::{HttpRequest, OidcToken, Task};

        let client = CloudTasks::builder()
            .build()
            .await
            .map_err(|e| AppError::Queue(format!("Cloud Tasks client error: {}", e)))?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JSON error: {}", e)))?;

        let http_request = HttpRequest::default()
            .set_url(format!("{}{}", service_url, endpoint))
            .set_http_method("POST")
            .set_body(axum::body::Bytes::from(body))
            .set_headers(std::collections::HashMap::from([(
                "Content-Type".to_string(),
                "application/json".to_string(),
            )]))
            .set_oidc_token(
                OidcToken::default()
                    .set_service_account_email(tasks_service_account(&self.project_id))
                    .set_audience(service_url.to_string()),
            );

        let task = Task::default().set_http_request(http_request);

        let _response = client
            .create_task()
            .set_parent(self.queue_path())
            .set_task(task)
            .send()
            .await
            .map_err(|e| AppError::Queue(format!("Cloud Tasks create error: {}", e)))?;

        Ok(())
    }
}
