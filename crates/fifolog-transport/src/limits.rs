//! Platform pipe limits.
//!
//! Two numbers matter to the writer:
//! - the atomic write limit: writes up to this size never interleave with
//!   writes from other processes on the same pipe (`PIPE_BUF`)
//! - the pipe capacity: the largest buffer the kernel will grant a pipe,
//!   beyond which a single write cannot complete in one piece

/// Conservative atomic write size where the platform does not expose `PIPE_BUF`.
pub const DEFAULT_ATOMIC_WRITE_LIMIT: usize = 4096;

/// Pipe capacity assumed on platforms without a queryable maximum.
pub const DEFAULT_PIPE_CAPACITY: usize = 4096;

/// Pipe capacity on macOS, which has no sysctl equivalent to `pipe-max-size`.
pub const MACOS_PIPE_CAPACITY: usize = 64 * 1024;

#[cfg(target_os = "linux")]
const PIPE_MAX_SIZE_PATH: &str = "/proc/sys/fs/pipe-max-size";

/// Largest write guaranteed to be atomic on a pipe.
pub fn atomic_write_limit() -> usize {
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    {
        libc::PIPE_BUF
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    )))]
    {
        DEFAULT_ATOMIC_WRITE_LIMIT
    }
}

/// Largest buffer a pipe can hold.
///
/// On Linux this reads `/proc/sys/fs/pipe-max-size`; if the file is missing or
/// unparsable the conservative default is used.
pub fn pipe_capacity() -> usize {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string(PIPE_MAX_SIZE_PATH)
            .ok()
            .and_then(|raw| parse_pipe_max_size(&raw))
            .unwrap_or(DEFAULT_PIPE_CAPACITY)
    }

    #[cfg(target_os = "macos")]
    {
        MACOS_PIPE_CAPACITY
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        DEFAULT_PIPE_CAPACITY
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_pipe_max_size(raw: &str) -> Option<usize> {
    raw.lines()
        .next()
        .and_then(|line| line.trim().parse::<usize>().ok())
        .filter(|size| *size > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_limit_is_positive_and_below_capacity() {
        let atomic = atomic_write_limit();
        assert!(atomic >= 512);
        assert!(pipe_capacity() >= atomic);
    }

    #[test]
    fn parses_proc_value() {
        assert_eq!(parse_pipe_max_size("1048576\n"), Some(1_048_576));
        assert_eq!(parse_pipe_max_size("  65536  "), Some(65_536));
    }

    #[test]
    fn rejects_garbage_and_zero() {
        assert_eq!(parse_pipe_max_size(""), None);
        assert_eq!(parse_pipe_max_size("lots"), None);
        assert_eq!(parse_pipe_max_size("0"), None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn linux_uses_pipe_buf() {
        assert_eq!(atomic_write_limit(), 4096);
    }
}
