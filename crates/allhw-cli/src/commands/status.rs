//! Status command - query a CI task once

use allhw_transport::{CiConfig, HttpTaskService, TaskService};
use anyhow::{Context, Result};

use crate::output::{OutputContext, TaskRow};

/// Longest output shown inline before it is elided
const PREVIEW_LEN: usize = 64;

pub async fn status(config: &CiConfig, task_id: &str, ctx: &OutputContext) -> Result<()> {
    let endpoint = config.validate()?;
    let service = HttpTaskService::new(&config.timeouts)?;

    let status = service
        .status(&endpoint, task_id)
        .await
        .with_context(|| format!("Failed to query task {}", task_id))?;

    let output = match status.decode_output() {
        Ok(output) => output.unwrap_or_default(),
        Err(e) => {
            ctx.warn(&format!("Task output is not valid base64: {}", e));
            Vec::new()
        }
    };

    ctx.print_one(&TaskRow {
        id: task_id.to_string(),
        status: status.status.clone(),
        output_len: output.len(),
        output: preview(&output),
    });
    Ok(())
}

fn preview(output: &[u8]) -> String {
    if output.is_empty() {
        return "-".to_string();
    }
    let text = String::from_utf8_lossy(&output[..output.len().min(PREVIEW_LEN)]);
    let text = text.escape_debug().to_string();
    if output.len() > PREVIEW_LEN {
        format!("{}...", text)
    } else {
        text
    }
}
