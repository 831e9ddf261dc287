use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod limits;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Own a channel and print every line its reader receives.
    Serve(ServeArgs),
    /// Write lines into an existing channel.
    Send(SendArgs),
    /// Show pipe limits and the resulting fragment budget.
    Limits(LimitsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Limits(args) => limits::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Channel path to create.
    pub path: PathBuf,
    /// Use blocking writes for lines forwarded from stdin.
    #[arg(long, env = "FIFOLOG_BLOCKING")]
    pub blocking: bool,
    /// Records the writer keeps while no reader is attached.
    #[arg(long, default_value_t = fifolog_frame::DEFAULT_CACHE_CAPACITY, env = "FIFOLOG_CACHE_CAPACITY")]
    pub cache_capacity: usize,
    /// Record terminator as hex bytes (e.g. 1e, 0d0a).
    #[arg(long, default_value = "1e", env = "FIFOLOG_TERMINATOR")]
    pub terminator: String,
    /// Stop after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Forward stdin lines through the channel; stop at end of input.
    #[arg(long)]
    pub stdin: bool,
    /// Time allowed for the reader to drain on shutdown.
    #[arg(long, default_value = "10s", env = "FIFOLOG_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Channel path to write to.
    pub path: PathBuf,
    /// Single line to send.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Send each line of a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Block until a reader is attached.
    #[arg(long, env = "FIFOLOG_BLOCKING")]
    pub blocking: bool,
    /// Deliver cached lines with blocking writes before exiting.
    #[arg(long)]
    pub flush: bool,
    /// Records the writer keeps while no reader is attached.
    #[arg(long, default_value_t = fifolog_frame::DEFAULT_CACHE_CAPACITY, env = "FIFOLOG_CACHE_CAPACITY")]
    pub cache_capacity: usize,
    /// Record terminator as hex bytes (e.g. 1e, 0d0a).
    #[arg(long, default_value = "1e", env = "FIFOLOG_TERMINATOR")]
    pub terminator: String,
}

#[derive(Args, Debug)]
pub struct LimitsArgs {
    /// Record terminator as hex bytes (e.g. 1e, 0d0a).
    #[arg(long, default_value = "1e", env = "FIFOLOG_TERMINATOR")]
    pub terminator: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Decode a hex-encoded terminator.
pub fn parse_terminator(hex: &str) -> CliResult<String> {
    let hex = hex.trim();
    if hex.is_empty() || hex.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("terminator must be an even number of hex digits: {hex:?}"),
        ));
    }

    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CliError::new(
            USAGE,
            format!("terminator is not valid hex: {hex:?}"),
        ));
    }

    let bytes: Vec<u8> = hex
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect();

    String::from_utf8(bytes)
        .map_err(|_| CliError::new(USAGE, format!("terminator is not valid UTF-8: {hex:?}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
