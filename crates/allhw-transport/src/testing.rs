//! Test utilities for allhw-transport
//!
//! [`FakeCiServer`] is an in-process HTTP stand-in for the CI service. Its
//! simulated board echoes the task input back as UART output.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::config::CiConfig;
use crate::service::TaskStatus;

/// How the fake service misbehaves
#[derive(Debug, Clone, Default)]
pub struct FakeCiBehavior {
    /// Answer this many submissions with 503 before accepting any
    pub reject_submissions: usize,
    /// Answer the first polls of each task with a non-JSON body
    pub malformed_polls: usize,
    /// Report "running" for this many polls before finishing
    pub running_polls: usize,
    /// While running, expose the first half of the output
    pub partial_output: bool,
}

/// A task as received by the fake service
#[derive(Debug, Clone)]
pub struct SubmittedTask {
    pub id: String,
    pub params: HashMap<String, String>,
    pub firmware_name: Option<String>,
    pub firmware: Vec<u8>,
    pub input: Vec<u8>,
    pub polls: usize,
}

#[derive(Default)]
struct FakeState {
    behavior: FakeCiBehavior,
    rejected: usize,
    tasks: Vec<SubmittedTask>,
}

type SharedState = Arc<Mutex<FakeState>>;

/// A fake CI server that shuts down when dropped
pub struct FakeCiServer {
    pub addr: SocketAddr,
    state: SharedState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl FakeCiServer {
    /// Path the service is mounted on
    pub const PATH: &'static str = "/ci/usertask";

    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(FakeCiBehavior::default()).await
    }

    pub async fn start_with(behavior: FakeCiBehavior) -> std::io::Result<Self> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state: SharedState = Arc::new(Mutex::new(FakeState {
            behavior,
            ..Default::default()
        }));
        let router = Router::new()
            .route(Self::PATH, get(task_status).post(submit_task))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Full endpoint URL of the fake service
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, Self::PATH)
    }

    /// Transport configuration pointing at this server with a short poll interval
    pub fn config(&self) -> CiConfig {
        CiConfig::builder(self.url())
            .poll_ms(10)
            .request_timeout_ms(5_000)
            .build()
    }

    /// Tasks accepted so far
    pub fn tasks(&self) -> Vec<SubmittedTask> {
        self.state.lock().tasks.clone()
    }

    /// Number of submissions answered with 503
    pub fn rejected(&self) -> usize {
        self.state.lock().rejected
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for FakeCiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// POST /ci/usertask
async fn submit_task(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Response {
    let mut firmware = None;
    let mut firmware_name = None;
    let mut input = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = match field.bytes().await {
            Ok(data) => data.to_vec(),
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };
        match name.as_str() {
            "firmware" => {
                firmware = Some(data);
                firmware_name = file_name;
            }
            "input" => input = Some(data),
            _ => {}
        }
    }

    let (Some(firmware), Some(input)) = (firmware, input) else {
        return (StatusCode::BAD_REQUEST, "firmware and input are required").into_response();
    };

    let mut state = state.lock();
    if state.rejected < state.behavior.reject_submissions {
        state.rejected += 1;
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }

    let id = format!("ci-{}", state.tasks.len() + 1);
    state.tasks.push(SubmittedTask {
        id: id.clone(),
        params,
        firmware_name,
        firmware,
        input,
        polls: 0,
    });
    (StatusCode::OK, id).into_response()
}

/// GET /ci/usertask?id={task_id}
async fn task_status(
    State(state): State<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(id) = params.get("id") else {
        return (StatusCode::BAD_REQUEST, "missing id").into_response();
    };

    let mut state = state.lock();
    let behavior = state.behavior.clone();
    let Some(task) = state.tasks.iter_mut().find(|task| &task.id == id) else {
        return (StatusCode::NOT_FOUND, "unknown task").into_response();
    };

    task.polls += 1;
    if task.polls <= behavior.malformed_polls {
        return (StatusCode::OK, "<html>bad gateway</html>").into_response();
    }

    let status = if task.polls - behavior.malformed_polls <= behavior.running_polls {
        if behavior.partial_output {
            TaskStatus::running_with_output(&task.input[..task.input.len() / 2])
        } else {
            TaskStatus::running()
        }
    } else {
        TaskStatus::finished(&task.input)
    };
    Json(status).into_response()
}
