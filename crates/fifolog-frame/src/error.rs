use std::path::PathBuf;

/// Errors that can occur while framing, writing, or reading lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Channel-level error.
    #[error("transport error: {0}")]
    Transport(#[from] fifolog_transport::TransportError),

    /// A blocking write to the channel failed.
    #[error("failed to write to channel {path}: {source}")]
    ChannelWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The line contains the record terminator and would be split in transit.
    #[error("line contains the record terminator")]
    LineContainsTerminator,

    /// The record terminator is empty.
    #[error("record terminator must not be empty")]
    EmptyTerminator,

    /// Framing overhead leaves no room for payload within the atomic write limit.
    #[error("atomic write limit {limit} leaves no payload budget after {overhead} bytes of overhead")]
    BudgetExhausted { limit: usize, overhead: usize },

    /// The cache must hold at least one entry.
    #[error("invalid cache capacity {0} (must be at least 1)")]
    InvalidCacheCapacity(usize),

    /// An I/O error occurred while reading records.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
