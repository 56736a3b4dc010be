//! CI task service interface
//!
//! The CI service is a batch task queue: a task is created from a firmware
//! image plus an input file, runs on a real board, and exposes the board's
//! UART output through a status endpoint.
//!
//! - [`HttpTaskService`] talks to the real service over HTTP
//! - [`MockTaskService`] is a scriptable in-memory service for tests

mod http;
pub mod mock;

pub use http::HttpTaskService;
pub use mock::MockTaskService;

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CiConfig;
use crate::error::ServiceError;

/// Protocol version understood by the CI service
pub const PROTOCOL_VERSION: &str = "V3";

/// Status value reported once a task's output is final
pub const STATUS_FINISHED: &str = "finished";

/// Query parameters attached to a task submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParams {
    pub version: &'static str,
    pub rate: u32,
    pub log: bool,
    /// Board-side run time limit in seconds
    pub timeout: u64,
    pub key: Option<String>,
    /// Input is raw bytes rather than text
    pub binary: bool,
}

impl TaskParams {
    pub fn from_config(config: &CiConfig) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            rate: config.rate,
            log: config.log,
            timeout: config.task_timeout,
            key: config.api_key.clone(),
            binary: true,
        }
    }

    /// Render as `(name, value)` query pairs in wire order
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("version", self.version.to_string()),
            ("rate", self.rate.to_string()),
            ("log", u8::from(self.log).to_string()),
            ("timeout", self.timeout.to_string()),
        ];
        if let Some(key) = &self.key {
            pairs.push(("key", key.clone()));
        }
        pairs.push(("binary", self.binary.to_string()));
        pairs
    }
}

/// Everything needed to create one remote task
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub endpoint: Url,
    /// File name reported for the firmware part
    pub firmware_name: String,
    pub firmware: Vec<u8>,
    pub input: Vec<u8>,
    pub params: TaskParams,
}

/// Status document returned by the CI service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: String,

    /// Base64 of everything the board has printed so far
    #[serde(default)]
    pub output: Option<String>,
}

impl TaskStatus {
    pub fn running() -> Self {
        Self {
            status: "running".to_string(),
            output: None,
        }
    }

    pub fn running_with_output(output: &[u8]) -> Self {
        Self {
            status: "running".to_string(),
            output: Some(STANDARD.encode(output)),
        }
    }

    pub fn finished(output: &[u8]) -> Self {
        Self {
            status: STATUS_FINISHED.to_string(),
            output: Some(STANDARD.encode(output)),
        }
    }

    /// Finished without any output field
    pub fn finished_without_output() -> Self {
        Self {
            status: STATUS_FINISHED.to_string(),
            output: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == STATUS_FINISHED
    }

    /// Decode the output snapshot, if the service sent one
    pub fn decode_output(&self) -> Result<Option<Vec<u8>>, ServiceError> {
        self.output
            .as_deref()
            .map(|encoded| STANDARD.decode(encoded.trim()))
            .transpose()
            .map_err(Into::into)
    }
}

/// Remote CI task queue
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Create a task and return its opaque identifier
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ServiceError>;

    /// Fetch the current status of a task
    async fn status(&self, endpoint: &Url, task_id: &str) -> Result<TaskStatus, ServiceError>;
}

#[async_trait]
impl<T: TaskService + ?Sized> TaskService for Arc<T> {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ServiceError> {
        (**self).submit(request).await
    }

    async fn status(&self, endpoint: &Url, task_id: &str) -> Result<TaskStatus, ServiceError> {
        (**self).status(endpoint, task_id).await
    }
}
