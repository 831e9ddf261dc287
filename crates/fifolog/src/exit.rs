use std::fmt;
use std::io;

use fifolog_frame::FrameError;
use fifolog_server::ServerError;
use fifolog_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Create { source, .. }
        | TransportError::Open { source, .. }
        | TransportError::Remove { source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            io_error(context, source)
        }
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::ChannelWrite { source, .. } | FrameError::Io(source) => {
            io_error(context, source)
        }
        FrameError::LineContainsTerminator => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::EmptyTerminator
        | FrameError::BudgetExhausted { .. }
        | FrameError::InvalidCacheCapacity(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Transport(err) => transport_error(context, err),
        ServerError::Frame(err) => frame_error(context, err),
        ServerError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ServerError::Spawn(source) => io_error(context, source),
        ServerError::ReaderExitTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ServerError::ReaderStartup(_) | ServerError::Dispatch(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn missing_channel_is_transport_error() {
        let err = frame_error(
            "open failed",
            FrameError::Transport(TransportError::NotFound(PathBuf::from("/tmp/x.fifo"))),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("open failed: "));
    }

    #[test]
    fn permission_denied_maps_to_50() {
        let err = transport_error(
            "create failed",
            TransportError::Create {
                path: PathBuf::from("/root/x.fifo"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn framing_errors_map_to_data_and_usage() {
        assert_eq!(
            frame_error("write failed", FrameError::LineContainsTerminator).code,
            DATA_INVALID
        );
        assert_eq!(
            frame_error("open failed", FrameError::InvalidCacheCapacity(0)).code,
            USAGE
        );
    }

    #[test]
    fn server_errors_map_by_kind() {
        assert_eq!(
            server_error("release", ServerError::ReaderExitTimeout(std::time::Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(
            server_error("serve", ServerError::ReaderStartup("gone".to_string())).code,
            FAILURE
        );
    }
}
