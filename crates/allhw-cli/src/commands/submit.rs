//! Submit command - create a CI task without waiting for it

use std::path::PathBuf;
use std::time::Duration;

use allhw_transport::{CiConfig, CiTransport, ConfigOverrides};
use anyhow::{Context, Result};

use crate::output::{OutputContext, TaskRow};

/// Create a task and print its id; the task keeps running after exit
pub async fn submit(
    config: CiConfig,
    firmware: PathBuf,
    input: Vec<u8>,
    overrides: ConfigOverrides,
    timeout: Option<Duration>,
    ctx: &OutputContext,
) -> Result<()> {
    let mut transport = CiTransport::new(config).context("Failed to create CI transport")?;
    transport.flash(&ConfigOverrides {
        firmware: Some(firmware),
        ..overrides
    })?;
    transport.open(&ConfigOverrides::default())?;

    ctx.info(&format!("Submitting {} input bytes...", input.len()));
    transport
        .write(&input, timeout)
        .await
        .context("Failed to create CI task")?;

    let id = transport.task_id().unwrap_or_default().to_string();
    transport.close();

    ctx.print_one(&TaskRow {
        id,
        status: "submitted".to_string(),
        output_len: 0,
        output: "-".to_string(),
    });
    Ok(())
}
