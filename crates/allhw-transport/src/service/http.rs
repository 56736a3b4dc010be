//! HTTP implementation of the CI task service

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::{SubmitRequest, TaskService, TaskStatus};
use crate::config::{ConfigError, TimeoutsConfig};
use crate::error::ServiceError;

/// CI service client over HTTP
///
/// Submission is a multipart `POST` with the task parameters in the query
/// string; status is a `GET` keyed by the `id` query parameter. Only
/// `200 OK` counts as success, matching the service.
#[derive(Debug, Clone)]
pub struct HttpTaskService {
    client: Client,
}

impl HttpTaskService {
    pub fn new(timeouts: &TimeoutsConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeouts.request())
            .connect_timeout(timeouts.connect())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl TaskService for HttpTaskService {
    #[instrument(skip(self, request), fields(endpoint = %request.endpoint, input_len = request.input.len()))]
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ServiceError> {
        let form = Form::new()
            .part(
                "firmware",
                Part::bytes(request.firmware.clone()).file_name(request.firmware_name.clone()),
            )
            .part("input", Part::bytes(request.input.clone()).file_name("input"));

        let response = self
            .client
            .post(request.endpoint.clone())
            .query(&request.params.query_pairs())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, "Submission response");

        if status != StatusCode::OK {
            return Err(ServiceError::server_error(status.as_u16(), body));
        }

        let task_id = body.trim();
        if task_id.is_empty() {
            return Err(ServiceError::Parse("empty task id".into()));
        }
        Ok(task_id.to_string())
    }

    #[instrument(skip(self, endpoint))]
    async fn status(&self, endpoint: &Url, task_id: &str) -> Result<TaskStatus, ServiceError> {
        let response = self
            .client
            .get(endpoint.clone())
            .query(&[("id", task_id)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(ServiceError::server_error(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| ServiceError::Parse(e.to_string()))
    }
}
