//! allhw-cli - run firmware on All-Hardware CI boards
//!
//! Drives the CI transport from the command line: submit a firmware image
//! with an input file, wait for the board to finish and print what it wrote
//! to its UART.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use allhw_transport::ConfigOverrides;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::CliOverrides;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "allhw-cli")]
#[command(author, version, about = "All-Hardware CI runner")]
#[command(propagate_version = true)]
struct Cli {
    /// CI service endpoint
    #[arg(short, long, env = "ALLHW_URL")]
    url: Option<String>,

    /// API key for the CI service
    #[arg(long, env = "ALLHW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "ALLHW_CONFIG")]
    config: Option<PathBuf>,

    /// Poll/retry interval in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,

    /// Output format for task summaries
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Task options shared by commands that create tasks
#[derive(Args)]
struct TaskArgs {
    /// Firmware image to flash
    #[arg(short, long)]
    firmware: PathBuf,

    /// Input file fed to the board's UART ("-" for stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Seconds to wait for each transport operation (default: no limit)
    #[arg(short, long, value_parser = parse_secs)]
    timeout: Option<Duration>,

    /// UART symbol rate
    #[arg(long)]
    rate: Option<u32>,

    /// Ask the service to keep a task log
    #[arg(long)]
    log: bool,

    /// Board-side run time limit in seconds
    #[arg(long)]
    task_timeout: Option<u64>,
}

impl TaskArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            rate: self.rate,
            log: self.log.then_some(true),
            task_timeout: self.task_timeout,
            ..Default::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run firmware with an input and print the board's output
    Run {
        #[command(flatten)]
        task: TaskArgs,

        /// Bytes requested per read
        #[arg(long, default_value = "4096")]
        chunk: usize,

        /// Print output as hex
        #[arg(long)]
        hex: bool,
    },

    /// Create a task and print its id without waiting
    Submit {
        #[command(flatten)]
        task: TaskArgs,
    },

    /// Query a task's status once
    Status {
        /// Task id returned by submit
        id: String,
    },
}

fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|e| format!("invalid number of seconds: {}", e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid timeout {}: {}", value, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries task output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let file_config = if let Some(config_path) = &cli.config {
        config::load_from(config_path)?
    } else {
        config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let ci_config = CliOverrides {
        url: cli.url.clone(),
        api_key: cli.api_key.clone(),
        poll_ms: cli.poll_ms,
    }
    .apply(&file_config);
    tracing::debug!("Using CI endpoint {}", ci_config.url);

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    match cli.command {
        Commands::Run { task, chunk, hex } => {
            let opts = commands::RunOptions {
                overrides: task.overrides(),
                firmware: task.firmware,
                input: task.input,
                chunk,
                timeout: task.timeout,
                hex,
            };
            commands::run(ci_config, opts, &ctx).await?;
        }

        Commands::Submit { task } => {
            let input = commands::read_input(task.input.as_deref())?;
            let overrides = task.overrides();
            commands::submit(ci_config, task.firmware, input, overrides, task.timeout, &ctx)
                .await?;
        }

        Commands::Status { id } => {
            commands::status(&ci_config, &id, &ctx).await?;
        }
    }

    Ok(())
}
