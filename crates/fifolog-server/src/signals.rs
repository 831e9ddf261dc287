//! Termination-signal capture for the reader process.
//!
//! SIGINT, SIGTERM and SIGQUIT do not kill the reader. The handler records the
//! signal number. The reader loop picks it up after the next record it
//! handles (or at its next idle point), logs it there, and turns it into a
//! drain-then-exit request that takes effect once the channel goes idle.

use std::sync::atomic::{AtomicI32, Ordering};

/// Signals the reader intercepts.
pub const TERMINATION_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT];

static RECEIVED: AtomicI32 = AtomicI32::new(0);

extern "C" fn record_signal(signal: libc::c_int) {
    RECEIVED.store(signal, Ordering::SeqCst);
}

/// Install the recording handler for every signal in [`TERMINATION_SIGNALS`].
pub fn install() -> std::io::Result<()> {
    for signal in TERMINATION_SIGNALS {
        // SAFETY: an all-zero sigaction is a valid starting value.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = record_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        // SAFETY: `action.sa_mask` is a valid sigset_t owned by this frame.
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        // SAFETY: `action` is fully initialized; the handler only stores to an atomic.
        let rc = unsafe { libc::sigaction(signal, &action, std::ptr::null_mut()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Take the most recently received termination signal, if any.
pub fn take_received() -> Option<libc::c_int> {
    match RECEIVED.swap(0, Ordering::SeqCst) {
        0 => None,
        signal => Some(signal),
    }
}

/// Short name for log output.
pub fn signal_name(signal: libc::c_int) -> &'static str {
    match signal {
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGKILL => "SIGKILL",
        _ => "signal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(libc::SIGQUIT), "SIGQUIT");
        assert_eq!(signal_name(0), "signal");
    }

    #[test]
    fn take_clears_recorded_signal() {
        record_signal(libc::SIGQUIT);
        assert_eq!(take_received(), Some(libc::SIGQUIT));
        assert_eq!(take_received(), None);
    }
}
