//! Command implementations for allhw-cli

pub mod run;
pub mod status;
pub mod submit;

pub use run::{read_input, run, RunOptions};
pub use status::status;
pub use submit::submit;
