use std::path::PathBuf;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The FIFO could not be created at the specified path.
    #[error("failed to create channel at {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No filesystem entry exists at the specified path.
    #[error("channel not found: {0}")]
    NotFound(PathBuf),

    /// The path exists but is not a named pipe.
    #[error("not a named pipe: {0}")]
    NotAFifo(PathBuf),

    /// Failed to open one end of the channel.
    #[error("failed to open channel {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to remove the channel.
    #[error("failed to remove channel {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
