//! Named-pipe channel management for fifolog.
//!
//! This is the lowest layer of fifolog. It owns:
//! - FIFO creation and removal at a filesystem path ([`Channel`])
//! - The blocking and non-blocking open modes used by readers and writers
//! - Platform pipe limits ([`limits`])
//!
//! Everything else builds on the [`Channel`] and [`WriteEnd`] types provided here.

pub mod error;
pub mod limits;
pub mod traits;

#[cfg(unix)]
pub mod fifo;

pub use error::{Result, TransportError};
pub use limits::{atomic_write_limit, pipe_capacity};
pub use traits::{is_transient, WriteEnd};

#[cfg(unix)]
pub use fifo::Channel;
