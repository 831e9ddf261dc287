use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

const LINE_SCHEMA_ID: &str = "https://schemas.fifolog.dev/cli/v1/line-received.schema.json";

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A command result that renders in every output format.
pub trait Report: Serialize {
    /// Rows of (field, value) for table and pretty output.
    fn rows(&self) -> Vec<(&'static str, String)>;
}

#[derive(Serialize)]
struct LineOutput<'a> {
    schema_id: &'a str,
    line: &'a str,
    len: usize,
    reader_pid: u32,
    timestamp: String,
}

/// Print one dispatched line. Runs inside the reader process.
pub fn print_line(line: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = LineOutput {
                schema_id: LINE_SCHEMA_ID,
                line,
                len: line.len(),
                reader_pid: std::process::id(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TIME", "SIZE", "LINE"])
                .add_row(vec![now_unix_seconds(), line.len().to_string(), line.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{}] ({} bytes) {line}", now_unix_seconds(), line.len());
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(line.as_bytes());
            let _ = out.write_all(b"\n");
            let _ = out.flush();
        }
    }
}

/// Print a command report.
pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in report.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = report
                .rows()
                .into_iter()
                .map(|(field, value)| format!("{field}={value}"))
                .collect();
            println!("{}", rendered.join(" "));
        }
    }
}

pub fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
