use std::time::Duration;

/// Errors that can occur while supervising a channel and its reader.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Channel-level error.
    #[error("transport error: {0}")]
    Transport(#[from] fifolog_transport::TransportError),

    /// Framing or writer error.
    #[error("frame error: {0}")]
    Frame(#[from] fifolog_frame::FrameError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The reader process could not be created.
    #[error("failed to spawn reader process: {0}")]
    Spawn(#[source] std::io::Error),

    /// The reader process died or never attached during start-up.
    #[error("reader failed to start: {0}")]
    ReaderStartup(String),

    /// The reader process did not exit within the shutdown timeout.
    #[error("reader did not exit within {0:?}")]
    ReaderExitTimeout(Duration),

    /// A line handler failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// A line handler returned an error or panicked.
#[derive(Debug, thiserror::Error)]
#[error("dispatch failed for line {line:?}: {reason}")]
pub struct DispatchError {
    /// The line being dispatched.
    pub line: String,
    /// Handler error message, or the panic payload.
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, ServerError>;
