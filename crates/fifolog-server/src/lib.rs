//! Reader process and supervisor lifecycle for fifolog channels.
//!
//! A [`Supervisor`] creates the channel, forks a reader process running a
//! [`ReaderLoop`], and hands the caller a [`fifolog_frame::Writer`]. Complete
//! lines are dispatched inside the reader through the caller's
//! [`Dispatcher`]. Release flushes the writer, sets the shared
//! [`TerminationFlag`], waits for the reader to drain, and removes the channel.

pub mod config;
pub mod error;
pub mod handler;
pub mod reader;

#[cfg(unix)]
pub mod flag;
#[cfg(unix)]
pub mod process;
#[cfg(unix)]
pub mod signals;
#[cfg(unix)]
pub mod supervisor;

pub use config::{ReaderConfig, SupervisorConfig, DEFAULT_PROCESS_NAME};
pub use error::{DispatchError, Result, ServerError};
pub use handler::{Dispatcher, Finalizer, HandlerError, Initializer, LineHandler, LogLines};
pub use reader::{ReaderLoop, ReaderState, ReaderStats};

#[cfg(unix)]
pub use flag::TerminationFlag;
#[cfg(unix)]
pub use process::{ReaderExit, ReaderProcess};
#[cfg(unix)]
pub use supervisor::Supervisor;
