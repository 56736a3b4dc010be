//! CI transport: a byte stream over a batch task queue
//!
//! A write creates one remote task holding the written bytes as board input.
//! Reads then poll that task and hand out its UART output, blocking until
//! enough bytes arrive, the task finishes, or the caller's timeout expires.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{CiConfig, ConfigOverrides, DEFAULT_FIRMWARE_RELATIVE_PATH};
use crate::error::{Result, TransportError};
use crate::service::{HttpTaskService, SubmitRequest, TaskParams, TaskService};
use crate::session::{Session, WriteStart};

/// Handshake timeouts reported to the host on open
///
/// The CI service has no session handshake, so all of these are zero and
/// every wait happens inside `read`/`write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportTimeouts {
    pub session_start_retry_timeout: Duration,
    pub session_start_timeout: Duration,
    pub session_established_timeout: Duration,
}

/// Caller deadline, fixed when an operation starts
#[derive(Debug, Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    /// `None` never expires
    fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.and_then(|t| Instant::now().checked_add(t)))
    }

    fn has_passed(&self) -> bool {
        self.0.is_some_and(|end| end < Instant::now())
    }
}

/// Transport over the All-Hardware CI service
pub struct CiTransport<S = HttpTaskService> {
    service: S,
    config: CiConfig,
    session: Session,
}

impl CiTransport<HttpTaskService> {
    /// Create a transport that talks HTTP to `config.url`
    pub fn new(config: CiConfig) -> Result<Self> {
        config.validate()?;
        let service = HttpTaskService::new(&config.timeouts)?;
        info!("CI transport created for {}", config.url);
        Ok(Self::with_service(config, service))
    }
}

impl<S: TaskService> CiTransport<S> {
    pub fn with_service(config: CiConfig, service: S) -> Self {
        Self {
            service,
            config,
            session: Session::new(),
        }
    }

    pub fn config(&self) -> &CiConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn is_open(&self) -> bool {
        !self.session.is_closed()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.session.task_id()
    }

    pub fn firmware(&self) -> Option<&Path> {
        self.session.firmware()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Select the firmware image for subsequent tasks
    ///
    /// Uses the `firmware` option when given, otherwise the Zephyr build
    /// output under the current directory. Nothing is sent to the service.
    pub fn flash(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if self.is_open() {
            return Err(TransportError::usage("flash requires a closed transport"));
        }
        let config = self.config.merged(overrides);
        let firmware = resolve_firmware(&config)?;
        debug!(firmware = %firmware.display(), "Firmware selected");

        self.session.flash(firmware)?;
        self.config = config;
        Ok(())
    }

    pub fn open(&mut self, overrides: &ConfigOverrides) -> Result<TransportTimeouts> {
        self.session.open()?;
        self.config = self.config.merged(overrides);
        Ok(TransportTimeouts::default())
    }

    /// Close the transport; calling it again is a no-op
    ///
    /// An outstanding remote task is left running on the service.
    pub fn close(&mut self) {
        if let Some(task_id) = self.session.close() {
            debug!(%task_id, "Transport closed with a live task");
        }
    }

    // =========================================================================
    // Write side: task submission
    // =========================================================================

    /// Start a remote task with `data` as the board's input
    ///
    /// A transport that already holds a task is closed and reopened first, so
    /// every write gets a fresh task. Failed submissions are retried every
    /// poll interval until `timeout` elapses; `None` retries forever.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<()> {
        let deadline = Deadline::after(timeout);
        if let WriteStart::Restarted { abandoned } = self.session.begin_write()? {
            debug!(task_id = %abandoned, "Dropping previous task before new write");
        }
        let request = self.submit_request(data).await?;
        let poll_interval = self.config.timeouts.poll_interval();

        loop {
            match self.service.submit(&request).await {
                Ok(task_id) => {
                    info!("CI task created: {}", task_id);
                    self.session.record_task(task_id);
                    return Ok(());
                }
                Err(e) => warn!("Task submission failed: {}", e),
            }

            if deadline.has_passed() {
                return Err(TransportError::IoTimeout { operation: "write" });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn submit_request(&self, data: &[u8]) -> Result<SubmitRequest> {
        let path = self.session.firmware().ok_or(TransportError::Closed)?;
        let firmware = tokio::fs::read(path)
            .await
            .map_err(|source| TransportError::Firmware {
                path: path.to_path_buf(),
                source,
            })?;
        let firmware_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "firmware".to_string());

        Ok(SubmitRequest {
            endpoint: self.config.validate()?,
            firmware_name,
            firmware,
            input: data.to_vec(),
            params: TaskParams::from_config(&self.config),
        })
    }

    // =========================================================================
    // Read side: polling and buffering
    // =========================================================================

    /// Read exactly `n` bytes of task output
    ///
    /// Returns fewer than `n` bytes only once the task has finished. A task
    /// that finishes with nothing left to read, or a deadline that passes
    /// first, yields [`TransportError::IoTimeout`]; bytes gathered by a
    /// timed-out read stay in the buffer for the next call.
    #[instrument(skip(self))]
    pub async fn read(&mut self, n: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let task_id = self.session.readable_task()?.to_string();
        let endpoint = self.config.validate()?;
        let deadline = Deadline::after(timeout);
        let poll_interval = self.config.timeouts.poll_interval();
        let mut out = Vec::new();

        loop {
            if self.session.needs_refresh() {
                self.refresh(&endpoint, &task_id).await;
            }

            out.extend_from_slice(self.session.consume(n - out.len()));
            if out.len() >= n {
                return Ok(out);
            }

            if self.session.is_finished() {
                if out.is_empty() {
                    return Err(TransportError::IoTimeout { operation: "read" });
                }
                debug!(got = out.len(), wanted = n, "Short read at end of output");
                return Ok(out);
            }

            if deadline.has_passed() {
                self.session.unconsume(out.len());
                return Err(TransportError::IoTimeout { operation: "read" });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Poll the task once; failures only mean "nothing new this time"
    async fn refresh(&mut self, endpoint: &Url, task_id: &str) {
        let status = match self.service.status(endpoint, task_id).await {
            Ok(status) => status,
            Err(e) => {
                debug!("Status poll for {} failed: {}", task_id, e);
                return;
            }
        };

        let finished = status.is_finished();
        let snapshot = match status.decode_output() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("Ignoring undecodable output for {}: {}", task_id, e);
                None
            }
        };
        let len = snapshot.as_ref().map(Vec::len);

        if finished && !self.session.is_finished() {
            info!("CI task {} finished", task_id);
        }
        if !self.session.apply_status(finished, snapshot) && len.is_some() {
            debug!(?len, cursor = self.session.cursor(), "Ignoring stale output snapshot");
        }
    }
}

fn resolve_firmware(config: &CiConfig) -> Result<PathBuf> {
    if let Some(path) = &config.firmware {
        return Ok(path.clone());
    }
    std::env::current_dir()
        .map(|dir| dir.join(DEFAULT_FIRMWARE_RELATIVE_PATH))
        .map_err(|source| TransportError::Firmware {
            path: PathBuf::from(DEFAULT_FIRMWARE_RELATIVE_PATH),
            source,
        })
}
