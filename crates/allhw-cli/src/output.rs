//! Output formatting for allhw-cli (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
///
/// Status messages go to stderr; stdout carries only command results so task
/// output can be piped.
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print a single item in the configured format
    pub fn print_one<T: Tabled + Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Table => {
                let table = Table::new([data]).to_string();
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => print_csv(data),
        }
    }
}

/// Print one item as CSV
fn print_csv<T: Serialize>(data: &T) {
    if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(data) {
        let headers: Vec<&str> = row.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        let values: Vec<String> = row
            .values()
            .map(|v| match v {
                serde_json::Value::String(s) => escape_csv(s),
                other => escape_csv(&other.to_string()),
            })
            .collect();
        println!("{}", values.join(","));
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Task display for status and submit commands
#[derive(Debug, Tabled, Serialize)]
pub struct TaskRow {
    #[tabled(rename = "Task")]
    pub id: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Output bytes")]
    pub output_len: usize,
    #[tabled(rename = "Output")]
    pub output: String,
}
