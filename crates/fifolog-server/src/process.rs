use std::fmt;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use fifolog_transport::Channel;
use tracing::{debug, error, info, warn};

use crate::config::ReaderConfig;
use crate::error::{Result, ServerError};
use crate::flag::TerminationFlag;
use crate::handler::{panic_message, Dispatcher};
use crate::reader::ReaderLoop;
use crate::signals;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How a reader process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Exited on its own with this status.
    Exited(i32),
    /// Terminated by this signal.
    Signaled(i32),
    /// Still running when the wait gave up.
    TimedOut,
    /// Killed after the wait gave up.
    Killed,
}

impl ReaderExit {
    /// Whether the reader drained and exited cleanly.
    pub fn is_clean(&self) -> bool {
        matches!(self, ReaderExit::Exited(0))
    }
}

impl fmt::Display for ReaderExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderExit::Exited(code) => write!(f, "exited with status {code}"),
            ReaderExit::Signaled(signal) => {
                write!(f, "terminated by {}", signals::signal_name(*signal))
            }
            ReaderExit::TimedOut => f.write_str("timed out"),
            ReaderExit::Killed => f.write_str("killed"),
        }
    }
}

/// A forked process running the reader loop over one channel.
#[derive(Debug)]
pub struct ReaderProcess {
    pid: libc::pid_t,
    exit: Option<ReaderExit>,
}

impl ReaderProcess {
    /// Fork a reader for `channel`.
    ///
    /// The child names itself, installs termination-signal capture, runs the
    /// initializer, opens the read end (blocking until a writer attaches), runs
    /// the loop until `flag` (or a signal, or the parent's death) asks it to
    /// stop, runs the finalizer, and exits. The child never returns from this
    /// call.
    ///
    /// Call this before the process starts any other threads. The child
    /// allocates and logs, so a lock held by another thread at fork time
    /// (allocator, tracing subscriber, stdio) would deadlock it.
    pub fn spawn<C>(
        channel: &Channel,
        terminator: &str,
        config: &ReaderConfig,
        flag: &TerminationFlag,
        dispatcher: Dispatcher<C>,
    ) -> Result<Self> {
        config.validate()?;

        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        // SAFETY: the child only runs the reader and leaves through `_exit`,
        // never returning into the caller's stack.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => Err(ServerError::Spawn(std::io::Error::last_os_error())),
            0 => {
                let code = match catch_unwind(AssertUnwindSafe(|| {
                    run_child(channel, terminator, config, flag, dispatcher)
                })) {
                    Ok(code) => code,
                    Err(payload) => {
                        error!(
                            reason = %panic_message(payload.as_ref()),
                            "reader process panicked"
                        );
                        1
                    }
                };
                let _ = std::io::stdout().flush();
                let _ = std::io::stderr().flush();
                // SAFETY: terminates the forked child without running the
                // parent's atexit handlers or destructors a second time.
                unsafe { libc::_exit(code) }
            }
            pid => {
                info!(pid, path = ?channel.path(), "spawned reader process");
                Ok(Self { pid, exit: None })
            }
        }
    }

    /// Reader process id.
    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Reap the reader if it has exited.
    pub fn try_wait(&mut self) -> std::io::Result<Option<ReaderExit>> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }

        let mut status: libc::c_int = 0;
        // SAFETY: `status` is a valid out-pointer; WNOHANG keeps the call non-blocking.
        let rc = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
        match rc {
            0 => Ok(None),
            -1 => Err(std::io::Error::last_os_error()),
            _ => {
                let exit = decode_status(status);
                debug!(pid = self.pid, %exit, "reaped reader process");
                self.exit = Some(exit);
                Ok(Some(exit))
            }
        }
    }

    /// Poll until the reader exits or `timeout` elapses.
    pub fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<ReaderExit>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(exit) = self.try_wait()? {
                return Ok(Some(exit));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Whether the reader is still running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    /// SIGKILL the reader and reap it.
    pub fn kill(&mut self) -> std::io::Result<ReaderExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }

        // SAFETY: plain syscall on a pid this handle forked and has not reaped.
        if unsafe { libc::kill(self.pid, libc::SIGKILL) } != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: `status` is a valid out-pointer.
            let rc = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if rc != -1 {
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        warn!(pid = self.pid, "killed reader process");
        self.exit = Some(ReaderExit::Killed);
        Ok(ReaderExit::Killed)
    }
}

fn decode_status(status: libc::c_int) -> ReaderExit {
    if libc::WIFEXITED(status) {
        ReaderExit::Exited(libc::WEXITSTATUS(status))
    } else if libc::WIFSIGNALED(status) {
        ReaderExit::Signaled(libc::WTERMSIG(status))
    } else {
        ReaderExit::Exited(-1)
    }
}

fn run_child<C>(
    channel: &Channel,
    terminator: &str,
    config: &ReaderConfig,
    flag: &TerminationFlag,
    mut dispatcher: Dispatcher<C>,
) -> i32 {
    set_process_name(&config.process_name);
    if let Err(err) = signals::install() {
        warn!(error = %err, "failed to install termination signal handlers");
    }
    let parent = current_parent();

    let mut ctx = dispatcher.initialize();

    let file = match channel.open_read() {
        Ok(file) => file,
        Err(err) => {
            error!(error = %err, "reader could not open channel");
            return 1;
        }
    };

    let mut reader = match ReaderLoop::new(file, terminator, config.clone()) {
        Ok(reader) => reader,
        Err(err) => {
            error!(error = %err, "reader could not start");
            return 1;
        }
    };

    let mut requested = false;
    let result = reader.run(&mut dispatcher, &mut ctx, || {
        if let Some(signal) = signals::take_received() {
            info!(signal = signals::signal_name(signal), "termination signal received; draining");
            requested = true;
        }
        if !requested && current_parent() != parent {
            warn!("supervisor process is gone; draining");
            requested = true;
        }
        requested || flag.is_requested()
    });

    drop(ctx);
    dispatcher.finalize();

    match result {
        Ok(_) => 0,
        Err(err) => {
            error!(error = %err, "reader loop failed");
            1
        }
    }
}

fn current_parent() -> libc::pid_t {
    // SAFETY: getppid has no preconditions and cannot fail.
    unsafe { libc::getppid() }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn set_process_name(name: &str) {
    let Ok(c_name) = std::ffi::CString::new(name) else {
        return;
    };
    // SAFETY: PR_SET_NAME reads a NUL-terminated string of at most 16 bytes;
    // the kernel truncates longer names.
    let rc = unsafe { libc::prctl(libc::PR_SET_NAME, c_name.as_ptr() as libc::c_ulong, 0, 0, 0) };
    if rc != 0 {
        debug!(error = %std::io::Error::last_os_error(), "failed to set reader process name");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_process_name(name: &str) {
    debug!(name, "process naming not supported on this platform");
}
