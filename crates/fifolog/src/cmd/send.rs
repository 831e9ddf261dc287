use std::io::BufRead;

use fifolog_frame::{WriteOutcome, Writer, WriterConfig};
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_terminator, SendArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat, Report};

#[derive(Serialize)]
struct SendOutput {
    schema_id: &'static str,
    path: String,
    correlation_id: String,
    blocking: bool,
    lines: usize,
    cached_after_write: usize,
    flushed: usize,
    pending: usize,
    evicted: u64,
}

impl Report for SendOutput {
    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("path", self.path.clone()),
            ("correlation_id", self.correlation_id.clone()),
            ("blocking", self.blocking.to_string()),
            ("lines", self.lines.to_string()),
            ("flushed", self.flushed.to_string()),
            ("pending", self.pending.to_string()),
            ("evicted", self.evicted.to_string()),
        ]
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = WriterConfig {
        blocking: args.blocking,
        line_terminator: parse_terminator(&args.terminator)?,
        cache_capacity: args.cache_capacity,
        ..WriterConfig::default()
    };
    let mut writer =
        Writer::open(&args.path, config).map_err(|err| frame_error("open failed", err))?;

    let mut lines = 0usize;
    let mut send = |line: &str| -> CliResult<()> {
        let outcome = writer
            .write(line)
            .map_err(|err| frame_error("write failed", err))?;
        if let WriteOutcome::Cached { pending } = outcome {
            debug!(pending, "line cached; no reader attached");
        }
        lines += 1;
        Ok(())
    };

    if let Some(data) = &args.data {
        send(data)?;
    } else if let Some(path) = &args.file {
        let text = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        for line in text.lines() {
            send(line)?;
        }
    } else {
        for line in std::io::stdin().lock().lines() {
            let line = line.map_err(|err| io_error("failed reading stdin", err))?;
            send(&line)?;
        }
    }

    let cached_after_write = writer.pending();
    let flushed = if args.flush { writer.flush() } else { 0 };

    let output = SendOutput {
        schema_id: "https://schemas.fifolog.dev/cli/v1/send-summary.schema.json",
        path: args.path.display().to_string(),
        correlation_id: writer.correlation_id().to_string(),
        blocking: writer.is_blocking(),
        lines,
        cached_after_write,
        flushed,
        pending: writer.pending(),
        evicted: writer.evicted(),
    };
    print_report(&output, format);

    Ok(SUCCESS)
}
