use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use fifolog_frame::{FrameError, Writer};
use fifolog_transport::{is_transient, Channel, TransportError, WriteEnd};
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::error::{Result, ServerError};
use crate::flag::TerminationFlag;
use crate::handler::Dispatcher;
use crate::process::{ReaderExit, ReaderProcess};

const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Owns a channel, its reader process, and the writer handed to the caller.
///
/// Dropping a supervisor releases it. Prefer [`Supervisor::release`] to learn
/// how the reader ended.
pub struct Supervisor {
    channel: Channel,
    writer: Writer,
    flag: TerminationFlag,
    reader: ReaderProcess,
    config: SupervisorConfig,
    released: bool,
}

impl Supervisor {
    /// Create the channel, start the reader, and return once it is attached.
    ///
    /// The reader is forked, so acquire before spawning threads of your own;
    /// see [`ReaderProcess::spawn`].
    pub fn acquire<C>(
        path: impl AsRef<Path>,
        config: SupervisorConfig,
        mut dispatcher: Dispatcher<C>,
    ) -> Result<Self> {
        config.validate()?;

        let channel = Channel::ensure(path)?;
        let writer = match Writer::with_end(channel.clone(), config.writer.clone()) {
            Ok(writer) => writer,
            Err(err) => {
                channel.remove();
                return Err(err.into());
            }
        };

        // Warm-up run in the supervising process; the context is discarded.
        let _ = dispatcher.initialize();

        let flag = match TerminationFlag::new() {
            Ok(flag) => flag,
            Err(err) => {
                channel.remove();
                return Err(ServerError::Spawn(err));
            }
        };

        let mut reader = match ReaderProcess::spawn(
            &channel,
            &config.writer.line_terminator,
            &config.reader,
            &flag,
            dispatcher,
        ) {
            Ok(reader) => reader,
            Err(err) => {
                channel.remove();
                return Err(err);
            }
        };

        if let Err(err) = attach_reader(
            &channel,
            &mut reader,
            config.writer.line_terminator.as_bytes(),
            config.startup_timeout,
        ) {
            if reader.is_running() {
                let _ = reader.kill();
            }
            channel.remove();
            return Err(err);
        }

        info!(path = ?channel.path(), pid = reader.pid(), "channel acquired");
        Ok(Self {
            channel,
            writer,
            flag,
            reader,
            config,
            released: false,
        })
    }

    /// Acquire, run `f` with the writer, and release on every exit path.
    pub fn scoped<C, T, E, F>(
        path: impl AsRef<Path>,
        config: SupervisorConfig,
        dispatcher: Dispatcher<C>,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Writer) -> std::result::Result<T, E>,
        E: From<ServerError>,
    {
        let mut supervisor = Self::acquire(path, config, dispatcher)?;
        let result = f(supervisor.writer_mut());
        let exit = supervisor.release();
        debug!(%exit, "scoped supervisor released");
        result
    }

    /// Flush, ask the reader to drain, wait for it, and remove the channel.
    pub fn release(mut self) -> ReaderExit {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ReaderExit {
        self.released = true;

        if !self.writer.is_blocking() && self.writer.pending() > 0 {
            if self.reader.is_running() {
                let flushed = self.writer.flush();
                debug!(flushed, "flushed writer cache");
            } else {
                warn!(
                    pending = self.writer.pending(),
                    "reader already gone; cached lines dropped"
                );
            }
        }

        self.flag.request();

        let timeout = self.config.shutdown_timeout;
        let exit = match self.reader.wait_timeout(timeout) {
            Ok(Some(exit)) => exit,
            Ok(None) => {
                let err = ServerError::ReaderExitTimeout(timeout);
                warn!(pid = self.reader.pid(), error = %err, "reader still running");
                if self.config.kill_on_timeout {
                    self.reader.kill().unwrap_or_else(|err| {
                        warn!(error = %err, "failed to kill reader");
                        ReaderExit::TimedOut
                    })
                } else {
                    ReaderExit::TimedOut
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to wait for reader");
                ReaderExit::TimedOut
            }
        };

        self.channel.remove();
        info!(path = ?self.channel.path(), %exit, "channel released");
        exit
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut Writer {
        &mut self.writer
    }

    pub fn path(&self) -> &Path {
        self.channel.path()
    }

    /// Reader process id.
    pub fn reader_pid(&self) -> i32 {
        self.reader.pid()
    }

    /// Whether the reader process is still running.
    pub fn is_reader_running(&mut self) -> bool {
        self.reader.is_running()
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.released {
            self.shutdown();
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("path", &self.channel.path())
            .field("reader", &self.reader)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

/// Write one bare terminator so the reader's blocking open completes.
///
/// Polls non-blocking opens rather than blocking, so a reader that dies during
/// start-up is reported instead of hanging the caller.
fn attach_reader(
    channel: &Channel,
    reader: &mut ReaderProcess,
    terminator: &[u8],
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match channel.open_write_nonblocking() {
            Ok(mut stream) => {
                return stream.write_all(terminator).map_err(|source| {
                    ServerError::Frame(FrameError::ChannelWrite {
                        path: channel.path().to_path_buf(),
                        source,
                    })
                });
            }
            Err(err) if is_transient(&err) => {}
            Err(source) => {
                return Err(TransportError::Open {
                    path: channel.path().to_path_buf(),
                    source,
                }
                .into());
            }
        }

        match reader.try_wait() {
            Ok(Some(exit)) => {
                return Err(ServerError::ReaderStartup(format!(
                    "reader {exit} before attaching"
                )));
            }
            Ok(None) => {}
            Err(err) => return Err(ServerError::ReaderStartup(err.to_string())),
        }

        if Instant::now() >= deadline {
            return Err(ServerError::ReaderStartup(format!(
                "reader did not attach within {timeout:?}"
            )));
        }
        std::thread::sleep(STARTUP_POLL_INTERVAL);
    }
}
