//! Session state for one open/close cycle of the transport
//!
//! All state changes go through the transition methods here, so the
//! transport's protocols never touch the fields directly and tests can
//! assert on each transition.

use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};

/// How a write obtained a clean session for its task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStart {
    /// No task was associated with the session
    Fresh,
    /// A previous task was dropped by an implicit close and reopen
    Restarted { abandoned: String },
}

/// Mutable transport state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    closed: bool,
    firmware: Option<PathBuf>,
    task_id: Option<String>,
    cursor: usize,
    buffer: Vec<u8>,
    finished: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            closed: true,
            firmware: None,
            task_id: None,
            cursor: 0,
            buffer: Vec::new(),
            finished: false,
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn firmware(&self) -> Option<&Path> {
        self.firmware.as_deref()
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Latest output snapshot of the current task
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes of the current snapshot not yet handed to the caller
    pub fn unread(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Whether a read should ask the service for a new snapshot
    pub fn needs_refresh(&self) -> bool {
        self.unread() == 0 && !self.finished
    }

    /// Record the firmware image; only allowed while closed
    pub fn flash(&mut self, firmware: PathBuf) -> Result<()> {
        if !self.closed {
            return Err(TransportError::usage("flash requires a closed transport"));
        }
        self.firmware = Some(firmware);
        self.buffer.clear();
        self.cursor = 0;
        self.finished = false;
        Ok(())
    }

    pub fn open(&mut self) -> Result<()> {
        if !self.closed {
            return Err(TransportError::usage("transport is already open"));
        }
        self.reset_stream();
        self.closed = false;
        Ok(())
    }

    /// Close the session, returning the task it was attached to
    ///
    /// The remote task is not cancelled; it runs to completion on its own.
    pub fn close(&mut self) -> Option<String> {
        self.closed = true;
        self.buffer.clear();
        self.cursor = 0;
        self.task_id.take()
    }

    /// Close and reopen in one step, keeping the firmware reference
    pub fn restart(&mut self) -> Option<String> {
        let abandoned = self.close();
        self.reset_stream();
        self.closed = false;
        abandoned
    }

    /// Check write preconditions and make room for a new task
    pub fn begin_write(&mut self) -> Result<WriteStart> {
        if self.closed || self.firmware.is_none() {
            return Err(TransportError::Closed);
        }
        if self.task_id.is_none() {
            return Ok(WriteStart::Fresh);
        }
        Ok(match self.restart() {
            Some(abandoned) => WriteStart::Restarted { abandoned },
            None => WriteStart::Fresh,
        })
    }

    pub fn record_task(&mut self, task_id: String) {
        self.task_id = Some(task_id);
    }

    /// Check read preconditions and return the task being read
    pub fn readable_task(&self) -> Result<&str> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.task_id
            .as_deref()
            .ok_or_else(|| TransportError::usage("read requires a prior write"))
    }

    /// Fold one status reply into the session
    ///
    /// `finished` latches. A snapshot replaces the buffer unless it is
    /// shorter than what has already been consumed, in which case it is
    /// stale and dropped. Returns whether the snapshot was taken.
    pub fn apply_status(&mut self, finished: bool, snapshot: Option<Vec<u8>>) -> bool {
        if finished {
            self.finished = true;
        }
        match snapshot {
            Some(snapshot) if snapshot.len() >= self.cursor => {
                self.buffer = snapshot;
                true
            }
            _ => false,
        }
    }

    /// Hand out up to `max` unread bytes
    pub fn consume(&mut self, max: usize) -> &[u8] {
        let start = self.cursor;
        let end = start + max.min(self.unread());
        self.cursor = end;
        &self.buffer[start..end]
    }

    /// Give back the last `count` consumed bytes
    pub fn unconsume(&mut self, count: usize) {
        self.cursor = self.cursor.saturating_sub(count);
    }

    fn reset_stream(&mut self) {
        self.cursor = 0;
        self.buffer.clear();
        self.finished = false;
    }
}
