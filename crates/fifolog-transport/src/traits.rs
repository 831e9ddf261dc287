use std::io::{ErrorKind, Write};
use std::path::Path;

/// The write side of a channel.
///
/// Writers open a fresh end for every attempt and close it afterwards, so the
/// abstraction is over *opening*, not over a long-lived stream.
pub trait WriteEnd {
    /// Stream returned by a successful open.
    type Stream: Write;

    /// Open for writing, blocking until a reader has the read end open.
    fn open_write(&self) -> std::io::Result<Self::Stream>;

    /// Open for writing without blocking.
    ///
    /// Fails with `ENXIO` when no reader is attached.
    fn open_write_nonblocking(&self) -> std::io::Result<Self::Stream>;

    /// Open for writing only if a reader is attached right now.
    ///
    /// Fails with `ENXIO` instead of waiting for a reader; writes on the
    /// returned stream block.
    fn open_write_attached(&self) -> std::io::Result<Self::Stream>;

    /// Path used in diagnostics.
    fn path(&self) -> &Path;
}

/// Returns true for the conditions a non-blocking writer treats as
/// "reader not available right now": no reader attached, broken pipe, or
/// a full pipe.
pub fn is_transient(err: &std::io::Error) -> bool {
    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::BrokenPipe) {
        return true;
    }
    is_transient_errno(err.raw_os_error())
}

#[cfg(unix)]
fn is_transient_errno(code: Option<i32>) -> bool {
    matches!(code, Some(code) if code == libc::ENXIO
        || code == libc::EPIPE
        || code == libc::EAGAIN
        || code == libc::EWOULDBLOCK)
}

#[cfg(not(unix))]
fn is_transient_errno(_code: Option<i32>) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_kinds() {
        assert!(is_transient(&std::io::Error::from(ErrorKind::WouldBlock)));
        assert!(is_transient(&std::io::Error::from(ErrorKind::BrokenPipe)));
        assert!(!is_transient(&std::io::Error::from(
            ErrorKind::PermissionDenied
        )));
        assert!(!is_transient(&std::io::Error::from(ErrorKind::NotFound)));
    }

    #[test]
    #[cfg(unix)]
    fn classifies_transient_errno() {
        assert!(is_transient(&std::io::Error::from_raw_os_error(libc::ENXIO)));
        assert!(is_transient(&std::io::Error::from_raw_os_error(libc::EPIPE)));
        assert!(is_transient(&std::io::Error::from_raw_os_error(libc::EAGAIN)));
        assert!(!is_transient(&std::io::Error::from_raw_os_error(
            libc::EACCES
        )));
        assert!(!is_transient(&std::io::Error::from_raw_os_error(
            libc::ENOSPC
        )));
    }
}
