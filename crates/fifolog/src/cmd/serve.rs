use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fifolog_frame::WriterConfig;
use fifolog_server::{Dispatcher, ReaderConfig, ReaderExit, Supervisor, SupervisorConfig};
use tracing::{info, warn};

use crate::cmd::{parse_duration, parse_terminator, ServeArgs};
use crate::exit::{server_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_line, OutputFormat};

const TICK: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|duration| Instant::now() + duration);

    let config = SupervisorConfig {
        writer: WriterConfig {
            blocking: args.blocking,
            line_terminator: parse_terminator(&args.terminator)?,
            cache_capacity: args.cache_capacity,
            ..WriterConfig::default()
        },
        reader: ReaderConfig::default(),
        shutdown_timeout: parse_duration(&args.shutdown_timeout)?,
        ..SupervisorConfig::default()
    };

    let dispatcher = Dispatcher::new(|| ()).on_line(move |line: &str, _: &mut ()| {
        print_line(line, format);
        Ok(())
    });

    let mut supervisor = Supervisor::acquire(&args.path, config, dispatcher)
        .map_err(|err| server_error("serve failed", err))?;
    info!(path = ?supervisor.path(), reader_pid = supervisor.reader_pid(), "serving channel");

    // Installed after the reader is forked; the reader has its own signal handling.
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let input = args.stdin.then(spawn_stdin_reader);

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("serve duration elapsed");
            break;
        }

        match &input {
            Some(lines) => match lines.recv_timeout(TICK) {
                Ok(line) => {
                    if let Err(err) = supervisor.writer_mut().write(&line) {
                        warn!(error = %err, "failed to forward line");
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    supervisor.writer_mut().drain();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("end of input");
                    break;
                }
            },
            None => {
                std::thread::sleep(TICK);
                supervisor.writer_mut().drain();
            }
        }

        if !supervisor.is_reader_running() {
            warn!("reader process exited early");
            break;
        }
    }

    match supervisor.release() {
        ReaderExit::Exited(0) => Ok(SUCCESS),
        ReaderExit::TimedOut => Err(CliError::new(TIMEOUT, "reader did not drain in time")),
        exit => Err(CliError::new(FAILURE, format!("reader {exit}"))),
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
