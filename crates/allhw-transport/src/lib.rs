//! All-Hardware CI transport
//!
//! Presents the All-Hardware CI service, a batch queue that flashes a
//! firmware image onto a real board, feeds it an input file over UART and
//! returns what the board printed, as a byte stream with blocking reads and
//! writes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use allhw_transport::{CiConfig, CiTransport, ConfigOverrides};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // The production endpoint needs an API key
//!     let config = CiConfig::builder(allhw_transport::config::DEFAULT_URL)
//!         .api_key("my-api-key")
//!         .build();
//!     let mut transport = CiTransport::new(config)?;
//!
//!     // Pick up build/zephyr/zephyr.hex from the current directory
//!     transport.flash(&ConfigOverrides::default())?;
//!     transport.open(&ConfigOverrides::default())?;
//!
//!     // One write creates one CI task...
//!     transport.write(b"hello", Some(Duration::from_secs(10))).await?;
//!
//!     // ...and reads drain its output
//!     let reply = transport.read(5, Some(Duration::from_secs(60))).await?;
//!     println!("{}", String::from_utf8_lossy(&reply));
//!
//!     transport.close();
//!     Ok(())
//! }
//! ```
//!
//! # Semantics
//!
//! - Every write starts a fresh remote task; writing again drops the
//!   previous task from the session.
//! - Reads return exactly the requested length, except at the end of a
//!   finished task's output, where the remainder is returned as a short read.
//! - A finished task with nothing left to read is reported as a timeout.
//! - Closing does not cancel the remote task.
//! - No API key is built in. Submissions to the production endpoint
//!   ([`config::DEFAULT_URL`]) need one set in [`CiConfig::api_key`] or
//!   [`ConfigOverrides::api_key`].
//!
//! # Testing
//!
//! [`service::MockTaskService`] replaces the HTTP layer in unit tests, and
//! [`testing::FakeCiServer`] serves the CI protocol over real HTTP.

pub mod blocking;
pub mod config;
mod error;
pub mod service;
pub mod session;
pub mod testing;
mod transport;

pub use blocking::BlockingTransport;
pub use config::{CiConfig, ConfigError, ConfigOverrides, TimeoutsConfig};
pub use error::{Result, ServiceError, TransportError};
pub use service::{HttpTaskService, MockTaskService, TaskService, TaskStatus};
pub use session::{Session, WriteStart};
pub use transport::{CiTransport, TransportTimeouts};
