//! Mock CI task service for testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use super::{SubmitRequest, TaskService, TaskStatus};
use crate::error::ServiceError;

/// Scriptable in-memory CI service
///
/// Submissions succeed with ids `task-1`, `task-2`, ... unless failures are
/// queued. Status replies are served from a script; the last entry repeats,
/// and an empty script reports a running task with no output.
#[derive(Default)]
pub struct MockTaskService {
    unavailable: AtomicBool,
    submit_failures: AtomicUsize,
    next_id: AtomicUsize,
    submissions: Mutex<Vec<SubmitRequest>>,
    status_script: Mutex<VecDeque<Result<TaskStatus, String>>>,
    status_queries: Mutex<Vec<String>>,
}

impl MockTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a status reply
    pub fn push_status(&self, status: TaskStatus) {
        self.status_script.lock().push_back(Ok(status));
    }

    /// Queue a reply the client cannot parse
    pub fn push_malformed_status(&self, reason: impl Into<String>) {
        self.status_script.lock().push_back(Err(reason.into()));
    }

    /// Make the next `count` submissions fail
    pub fn fail_submissions(&self, count: usize) {
        self.submit_failures.store(count, Ordering::SeqCst);
    }

    /// Simulate a service that never answers successfully
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of submission attempts, successful or not
    pub fn submit_attempts(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().clone()
    }

    pub fn status_queries(&self) -> Vec<String> {
        self.status_queries.lock().clone()
    }

    pub fn status_count(&self) -> usize {
        self.status_queries.lock().len()
    }

    fn next_status(&self) -> Result<TaskStatus, String> {
        let mut script = self.status_script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or_else(|| Ok(TaskStatus::running()))
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(TaskStatus::running()))
        }
    }
}

#[async_trait]
impl TaskService for MockTaskService {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ServiceError> {
        self.submissions.lock().push(request.clone());

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("mock service offline".into()));
        }

        let failing = self
            .submit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ServiceError::server_error(503, "mock submission failure"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(id, "Mock service: task created");
        Ok(format!("task-{}", id))
    }

    async fn status(&self, _endpoint: &Url, task_id: &str) -> Result<TaskStatus, ServiceError> {
        self.status_queries.lock().push(task_id.to_string());

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("mock service offline".into()));
        }

        self.next_status().map_err(ServiceError::Parse)
    }
}
