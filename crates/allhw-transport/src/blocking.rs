//! Blocking wrapper around [`CiTransport`]
//!
//! For synchronous hosts. Owns a current-thread tokio runtime and drives each
//! call to completion on the calling thread, so it must not be used from
//! inside another async runtime.

use std::path::Path;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::config::{CiConfig, ConfigOverrides};
use crate::error::Result;
use crate::service::{HttpTaskService, TaskService};
use crate::transport::{CiTransport, TransportTimeouts};

pub struct BlockingTransport<S = HttpTaskService> {
    inner: CiTransport<S>,
    runtime: Runtime,
}

impl BlockingTransport<HttpTaskService> {
    pub fn new(config: CiConfig) -> Result<Self> {
        Ok(Self {
            inner: CiTransport::new(config)?,
            runtime: new_runtime()?,
        })
    }
}

impl<S: TaskService> BlockingTransport<S> {
    pub fn with_service(config: CiConfig, service: S) -> Result<Self> {
        Ok(Self {
            inner: CiTransport::with_service(config, service),
            runtime: new_runtime()?,
        })
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub fn firmware(&self) -> Option<&Path> {
        self.inner.firmware()
    }

    pub fn flash(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        self.inner.flash(overrides)
    }

    pub fn open(&mut self, overrides: &ConfigOverrides) -> Result<TransportTimeouts> {
        self.inner.open(overrides)
    }

    pub fn close(&mut self) {
        self.inner.close()
    }

    /// Blocks the calling thread until the task is created or `timeout` passes
    pub fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<()> {
        self.runtime.block_on(self.inner.write(data, timeout))
    }

    /// Blocks the calling thread until `n` bytes, end of output, or `timeout`
    pub fn read(&mut self, n: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        self.runtime.block_on(self.inner.read(n, timeout))
    }
}

fn new_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| crate::config::ConfigError::IoError(e.to_string()).into())
}
