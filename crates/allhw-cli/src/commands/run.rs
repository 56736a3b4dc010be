//! Run command - execute firmware on a CI board and collect its output

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use allhw_transport::{CiConfig, CiTransport, ConfigOverrides, TransportError};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::OutputContext;

/// Options for a single run
pub struct RunOptions {
    pub firmware: PathBuf,
    pub input: Option<PathBuf>,
    pub overrides: ConfigOverrides,
    pub chunk: usize,
    pub timeout: Option<Duration>,
    pub hex: bool,
}

/// Flash, send the input, and stream the board's output to stdout
pub async fn run(config: CiConfig, opts: RunOptions, ctx: &OutputContext) -> Result<()> {
    let input = read_input(opts.input.as_deref())?;

    let mut transport = CiTransport::new(config).context("Failed to create CI transport")?;
    let flash_overrides = ConfigOverrides {
        firmware: Some(opts.firmware.clone()),
        ..opts.overrides
    };
    transport.flash(&flash_overrides)?;
    transport.open(&ConfigOverrides::default())?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {elapsed} {msg}")
            .context("Invalid progress template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    if ctx.quiet {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    spinner.set_message(format!("Submitting {} input bytes...", input.len()));
    transport
        .write(&input, opts.timeout)
        .await
        .context("Failed to create CI task")?;

    let task_id = transport.task_id().unwrap_or_default().to_string();
    spinner.set_message(format!("Waiting for task {}...", task_id));

    let output = drain(&mut transport, opts.chunk, opts.timeout).await;
    spinner.finish_and_clear();
    transport.close();
    let output = output?;

    emit(&output, opts.hex)?;
    ctx.success(&format!(
        "Task {} finished with {} output bytes",
        task_id,
        output.len()
    ));
    Ok(())
}

/// Read until the task's output is exhausted
async fn drain(
    transport: &mut CiTransport,
    chunk: usize,
    timeout: Option<Duration>,
) -> Result<Vec<u8>> {
    let chunk = chunk.max(1);
    let mut output = Vec::new();
    loop {
        match transport.read(chunk, timeout).await {
            Ok(bytes) => {
                let short = bytes.len() < chunk;
                output.extend_from_slice(&bytes);
                if short {
                    return Ok(output);
                }
            }
            // A finished task with nothing left is the end of the stream
            Err(TransportError::IoTimeout { .. }) if transport.session().is_finished() => {
                return Ok(output);
            }
            Err(e) => return Err(e).context("Failed to read task output"),
        }
    }
}

pub fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        None => Ok(Vec::new()),
        Some(p) if p == Path::new("-") => {
            let mut data = Vec::new();
            std::io::Read::read_to_end(&mut std::io::stdin(), &mut data)
                .context("Failed to read input from stdin")?;
            Ok(data)
        }
        Some(p) => std::fs::read(p)
            .with_context(|| format!("Failed to read input file: {}", p.display())),
    }
}

fn emit(output: &[u8], hex: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if hex {
        writeln!(stdout, "{}", hex::encode(output))?;
    } else {
        stdout.write_all(output)?;
    }
    stdout.flush()?;
    Ok(())
}
